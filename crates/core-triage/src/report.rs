//! End-of-run reporting.

use crate::{BugBank, DifferentialKind};
use std::fmt;
use std::process::Command;
use std::time::Duration;

/// Why the run stopped. Every exit path funnels through one of these so the
/// report always names its reason.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    NoMoreMutationCandidates,
    AutoTermination(f64),
    KeyboardInterrupt,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::NoMoreMutationCandidates => f.write_str("No More Mutation Candidates"),
            Termination::AutoTermination(secs) => {
                write!(f, "Auto-Termination after {secs} seconds")
            }
            Termination::KeyboardInterrupt => f.write_str("Keyboard Interrupt"),
        }
    }
}

/// Coordinator-owned tallies, bumped as results are consumed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub inputs_run: u64,
    pub fingerprints_explored: u64,
    pub generations: u64,
    pub exit_differentials: u64,
    pub output_differentials: u64,
}

pub struct RunReport<'a> {
    pub termination: Termination,
    pub wall_clock: Duration,
    pub stats: RunStats,
    pub bank: Option<&'a BugBank>,
}

impl RunReport<'_> {
    /// Emit the summary to stderr. The summary is output, not telemetry; it
    /// bypasses the tracing pipeline.
    pub fn emit(&self) {
        eprint!("{}", self.render());
    }

    pub fn render(&self) -> String {
        use fmt::Write;
        let mut out = String::new();
        // Writing to a String cannot fail; the results are discarded.
        let _ = writeln!(out, "=== driftfuzz run summary ===");
        let _ = writeln!(out, "commit:            {}", commit_id().as_deref().unwrap_or("unknown"));
        let _ = writeln!(out, "termination:       {}", self.termination);
        let _ = writeln!(out, "wall clock:        {:.1}s", self.wall_clock.as_secs_f64());
        let _ = writeln!(out, "cpu time:          {:.1}s", cpu_seconds());
        let _ = writeln!(out, "generations:       {}", self.stats.generations);
        let _ = writeln!(out, "inputs run:        {}", self.stats.inputs_run);
        let _ = writeln!(out, "fingerprints:      {}", self.stats.fingerprints_explored);
        let _ = writeln!(
            out,
            "differentials:     {} exit-status, {} stdout",
            self.stats.exit_differentials, self.stats.output_differentials
        );
        if let Some(bank) = self.bank {
            let _ = writeln!(out, "bugs recorded:     {}", bank.total_recorded());
            let _ = writeln!(out, "unique bugprints:  {}", bank.unique_bugprints());
            let _ = writeln!(
                out,
                "  exit-status bugprints: {}",
                bank.count_by_kind(DifferentialKind::ExitStatus)
            );
            let _ = writeln!(
                out,
                "  stdout bugprints:      {}",
                bank.count_by_kind(DifferentialKind::Output)
            );
            for (bugprint, record) in bank.records() {
                let _ = writeln!(
                    out,
                    "bugprint {bugprint}: kind={} count={}",
                    record.kind.as_str(),
                    record.count
                );
                for example in &record.examples {
                    let _ = writeln!(out, "  reduction: {}", printable(example));
                }
            }
        }
        out
    }
}

fn printable(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    format!("{:?}", text)
}

/// Best-effort current commit; the fuzzer often runs from a checkout and the
/// id anchors a summary to the code that produced it.
fn commit_id() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!id.is_empty()).then_some(id)
}

/// User+system CPU seconds for this process and its reaped children (the
/// targets dominate).
#[cfg(unix)]
fn cpu_seconds() -> f64 {
    fn usage_of(who: libc::c_int) -> f64 {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // getrusage fills the struct or fails; the zeroed fallback reads as 0.
        let rc = unsafe { libc::getrusage(who, usage.as_mut_ptr()) };
        if rc != 0 {
            return 0.0;
        }
        let usage = unsafe { usage.assume_init() };
        let user = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1e6;
        let system = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1e6;
        user + system
    }
    usage_of(libc::RUSAGE_SELF) + usage_of(libc::RUSAGE_CHILDREN)
}

#[cfg(not(unix))]
fn cpu_seconds() -> f64 {
    0.0
}
