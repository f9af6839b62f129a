//! Subprocess coverage runner wrapping afl-showmap.
//!
//! Per target, every invocation launches two children: a traced run through
//! `afl-showmap` (edge coverage into a per-target trace file) and an untraced
//! direct run that supplies the exit status and, in output mode, the captured
//! stdout. Both read the input from a scratch file on stdin. The scratch
//! directory is unique per invocation, so concurrent runs never collide.

use crate::{CoverageRunner, ExecError, parse_trace};
use core_config::{Config, TargetConfig};
use core_model::{ExecOutcome, Trace, normalize_status};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Headroom past the showmap timeout before a child is killed outright.
const WAIT_GRACE: Duration = Duration::from_millis(500);

pub struct ShowmapRunner {
    targets: Vec<TargetConfig>,
    timeout: Duration,
    timeout_ms: u64,
    scratch_root: PathBuf,
    capture_stdout: bool,
    raw_statuses: bool,
    scratch_counter: AtomicU64,
}

impl ShowmapRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            targets: config.targets.clone(),
            timeout: config.timeout(),
            timeout_ms: config.timeout_ms,
            scratch_root: config.trace_dir.clone(),
            capture_stdout: config.output_differentials_matter,
            raw_statuses: config.exit_statuses_matter,
            scratch_counter: AtomicU64::new(0),
        }
    }

    fn run_in(&self, scratch: &Path, input: &[u8]) -> Result<ExecOutcome, ExecError> {
        let input_path = scratch.join("input");
        fs::write(&input_path, input).map_err(|source| ExecError::InputWrite {
            path: input_path.clone(),
            source,
        })?;

        let mut children = Vec::with_capacity(self.targets.len());
        for (index, target) in self.targets.iter().enumerate() {
            let trace_path = scratch.join(format!("trace-{index}"));
            let traced = self.spawn_traced(target, &input_path, &trace_path);
            let untraced = self.spawn_untraced(target, &input_path);
            children.push((traced, untraced, trace_path));
        }

        let deadline = Instant::now() + self.timeout + WAIT_GRACE;
        let mut outcome = ExecOutcome::default();
        for (traced, untraced, trace_path) in children {
            if let Some(mut child) = traced {
                // The tracer's own exit status carries no signal; only the
                // trace file it leaves behind matters.
                let _ = wait_with_deadline(&mut child, deadline);
            }
            let (status, stdout) = match untraced {
                Some(mut child) => {
                    let raw = wait_with_deadline(&mut child, deadline);
                    let bytes = child
                        .stdout
                        .take()
                        .map(|mut pipe| {
                            let mut buf = Vec::new();
                            let _ = pipe.read_to_end(&mut buf);
                            buf
                        })
                        .unwrap_or_default();
                    (raw, bytes)
                }
                // Spawn failure observed as command-not-found.
                None => (127, Vec::new()),
            };
            outcome
                .traces
                .push(fs::read(&trace_path).map_or_else(|_| Trace::empty(), |b| parse_trace(&b)));
            outcome
                .statuses
                .push(normalize_status(status, self.raw_statuses));
            outcome.stdouts.push(stdout);
        }
        Ok(outcome)
    }

    fn spawn_traced(&self, target: &TargetConfig, input: &Path, trace_path: &Path) -> Option<Child> {
        let argv = showmap_command_line(target, self.timeout_ms, trace_path);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        self.spawn(cmd, target, input, Stdio::null())
    }

    fn spawn_untraced(&self, target: &TargetConfig, input: &Path) -> Option<Child> {
        let mut cmd = if target.python_afl {
            let mut cmd = Command::new("python3");
            cmd.arg(&target.executable);
            cmd
        } else {
            Command::new(&target.executable)
        };
        cmd.args(&target.args);
        let stdout = if self.capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        self.spawn(cmd, target, input, stdout)
    }

    fn spawn(
        &self,
        mut cmd: Command,
        target: &TargetConfig,
        input: &Path,
        stdout: Stdio,
    ) -> Option<Child> {
        let stdin = match File::open(input) {
            Ok(file) => file,
            Err(err) => {
                warn!(target: "exec", ?err, "input_file_open_failed");
                return None;
            }
        };
        cmd.envs(&target.env)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::null());
        match cmd.spawn() {
            Ok(child) => Some(child),
            Err(err) => {
                debug!(
                    target: "exec",
                    executable = %target.executable.display(),
                    ?err,
                    "spawn_failed"
                );
                None
            }
        }
    }
}

impl CoverageRunner for ShowmapRunner {
    fn run(&self, input: &[u8]) -> Result<ExecOutcome, ExecError> {
        let scratch = self.scratch_root.join(format!(
            "run-{}-{}",
            std::process::id(),
            self.scratch_counter.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&scratch).map_err(|source| ExecError::Scratch {
            path: scratch.clone(),
            source,
        })?;
        let outcome = self.run_in(&scratch, input);
        if let Err(err) = fs::remove_dir_all(&scratch) {
            warn!(target: "exec", path = %scratch.display(), ?err, "scratch_cleanup_failed");
        }
        outcome
    }
}

/// The argv used to trace one target, exposed for inspection and tests.
pub fn showmap_command_line(target: &TargetConfig, timeout_ms: u64, trace_path: &Path) -> Vec<String> {
    let mut argv: Vec<String> = Vec::new();
    if target.python_afl {
        argv.push("py-afl-showmap".into());
    } else {
        argv.push("afl-showmap".into());
        if target.qemu {
            argv.push("-Q".into());
        }
    }
    // -q: traced stdout is uninteresting; -e: edge coverage, no hit counts.
    argv.push("-q".into());
    argv.push("-e".into());
    argv.push("-o".into());
    argv.push(trace_path.display().to_string());
    argv.push("-t".into());
    argv.push(timeout_ms.to_string());
    argv.push("--".into());
    if target.python_afl {
        argv.push("python3".into());
    }
    argv.push(target.executable.display().to_string());
    argv.extend(target.args.iter().cloned());
    argv
}

fn wait_with_deadline(child: &mut Child, deadline: Instant) -> i32 {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return exit_code(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    return child.wait().map_or(1, exit_code);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(err) => {
                warn!(target: "exec", ?err, "child_wait_failed");
                return 1;
            }
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            // Shell convention keeps signal deaths total and non-zero.
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(body: &str) -> Config {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(body.as_bytes()).unwrap();
        core_config::load(tmp.path()).unwrap()
    }

    fn target(body: &str) -> TargetConfig {
        config(body).targets.remove(0)
    }

    #[test]
    fn command_line_for_plain_target() {
        let target = target("[[targets]]\nexecutable = \"/opt/parse_a\"\nargs = [\"--uri\"]\n");
        let argv = showmap_command_line(&target, 250, Path::new("/tmp/t0"));
        assert_eq!(
            argv,
            [
                "afl-showmap",
                "-q",
                "-e",
                "-o",
                "/tmp/t0",
                "-t",
                "250",
                "--",
                "/opt/parse_a",
                "--uri"
            ]
        );
    }

    #[test]
    fn command_line_for_qemu_target() {
        let target = target("[[targets]]\nexecutable = \"/opt/parse_b\"\nqemu = true\n");
        let argv = showmap_command_line(&target, 100, Path::new("t"));
        assert_eq!(argv[..2], ["afl-showmap", "-Q"]);
    }

    #[test]
    fn command_line_for_python_target() {
        let target = target("[[targets]]\nexecutable = \"targets/urllib.py\"\npython_afl = true\n");
        let argv = showmap_command_line(&target, 100, Path::new("t"));
        assert_eq!(argv[0], "py-afl-showmap");
        let sep = argv.iter().position(|a| a == "--").unwrap();
        assert_eq!(argv[sep + 1], "python3");
        assert_eq!(argv[sep + 2], "targets/urllib.py");
    }

    // The runner's plumbing can be exercised without afl-showmap installed:
    // the traced spawn fails (observed as an empty trace) while the untraced
    // child runs for real.
    #[test]
    fn untraced_child_supplies_status_and_stdout() {
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(&format!(
            "trace_dir = {:?}\ntimeout_ms = 2000\n[[targets]]\nexecutable = \"/bin/cat\"\n",
            scratch.path()
        ));
        let runner = ShowmapRunner::new(&cfg);
        let outcome = runner.run(b"s://h/p").unwrap();
        assert_eq!(outcome.statuses, vec![0]);
        assert_eq!(outcome.stdouts, vec![b"s://h/p".to_vec()]);
        assert!(outcome.traces[0].is_empty());
    }

    #[test]
    fn hung_child_is_killed_and_observed_nonzero() {
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(&format!(
            "trace_dir = {:?}\ntimeout_ms = 50\n[[targets]]\nexecutable = \"/bin/sleep\"\nargs = [\"10\"]\n",
            scratch.path()
        ));
        let runner = ShowmapRunner::new(&cfg);
        let outcome = runner.run(b"").unwrap();
        assert_eq!(outcome.statuses, vec![1], "killed child normalizes to nonzero");
        assert!(outcome.traces[0].is_empty());
    }

    #[test]
    fn scratch_directories_are_cleaned_up() {
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(&format!(
            "trace_dir = {:?}\ntimeout_ms = 2000\n[[targets]]\nexecutable = \"/bin/cat\"\n",
            scratch.path()
        ));
        let runner = ShowmapRunner::new(&cfg);
        runner.run(b"x").unwrap();
        runner.run(b"y").unwrap();
        let leftovers: Vec<_> = fs::read_dir(scratch.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch dirs should be removed: {leftovers:?}");
    }
}
