//! Configuration loading and validation.
//!
//! The run is described by `driftfuzz.toml` (or an override path provided by
//! the binary). Unknown fields are ignored so the surface can grow without
//! breaking older files; every field has a default except the target table,
//! which must be present and non-empty. Configuration problems are the only
//! fatal errors in the system: they are reported before the loop starts and
//! the process exits non-zero.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} could not be read: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("configuration file {} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no fuzzing targets configured (add at least one [[targets]] entry)")]
    NoTargets,
    #[error("target executable {} does not exist", .0.display())]
    MissingTarget(PathBuf),
    #[error("seed directory {} does not exist", .0.display())]
    MissingSeedDir(PathBuf),
    #[error("max_bytes_reduction must be at least 1")]
    ZeroReductionWidth,
    #[error("rough_desired_queue_len must be at least 1")]
    ZeroQueueLen,
}

/// Which catalogue of canonical minimal inputs the indexer is built from.
///
/// Encoded as an integer in the file: 0 complete, 1 valid-only, 2 empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum TreeSelection {
    /// All 2^7 component combinations, including shapes invalid under the RFC.
    /// Invalid shapes earn their own tags instead of collapsing onto `""`.
    Complete,
    /// Only shapes with at least a scheme and a host.
    Valid,
    /// Only the empty payload.
    Empty,
}

impl TryFrom<u8> for TreeSelection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Complete),
            1 => Ok(Self::Valid),
            2 => Ok(Self::Empty),
            other => Err(format!(
                "fundamental_tree_selection must be 0 (complete), 1 (valid) or 2 (empty), got {other}"
            )),
        }
    }
}

/// One fuzzing target: the executable, its arguments, the tracer flags it
/// needs, and the environment it runs under.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Binary was not built with instrumentation; run showmap in QEMU mode.
    #[serde(default)]
    pub qemu: bool,
    /// Target is a Python script; trace through py-afl-showmap.
    #[serde(default)]
    pub python_afl: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_seed_dir")]
    pub seed_dir: PathBuf,
    #[serde(default = "Config::default_trace_dir")]
    pub trace_dir: PathBuf,
    #[serde(default = "Config::default_bugs_dir")]
    pub bugs_dir: PathBuf,
    #[serde(default = "Config::default_minimums_dir")]
    pub minimums_dir: PathBuf,
    #[serde(default = "Config::default_tree_file")]
    pub tree_file: PathBuf,
    /// Per-target hard timeout, milliseconds.
    #[serde(default = "Config::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether stdout disagreement counts as a differential (and enters the
    /// resultprint).
    #[serde(default = "Config::default_true")]
    pub output_differentials_matter: bool,
    /// Raw exit codes vs zero/nonzero collapse.
    #[serde(default)]
    pub exit_statuses_matter: bool,
    /// Soft per-generation queue cap; a refill pass may overshoot by one
    /// round of candidates.
    #[serde(default = "Config::default_queue_len")]
    pub rough_desired_queue_len: usize,
    #[serde(default = "Config::default_tree_selection")]
    pub fundamental_tree_selection: TreeSelection,
    /// Peel grammar rules down to their canonical minimums instead of
    /// deleting them outright.
    #[serde(default)]
    pub grammar_reductions: bool,
    /// Top width for the descending byte-deletion pass.
    #[serde(default = "Config::default_max_bytes_reduction")]
    pub max_bytes_reduction: usize,
    /// Wall-clock budget in seconds; negative disables auto-termination.
    #[serde(default = "Config::default_auto_termination")]
    pub auto_termination_secs: f64,
    /// Classification, bucketing and per-bug reporting.
    #[serde(default = "Config::default_true")]
    pub bug_info: bool,
    /// Grammar description; absent means grammar mutation and grammar peel
    /// are disabled for the run.
    #[serde(default)]
    pub grammar_file: Option<PathBuf>,
    /// How many example reductions the summary shows per bugprint.
    #[serde(default = "Config::default_report_examples")]
    pub report_examples: usize,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    fn default_seed_dir() -> PathBuf {
        PathBuf::from("seeds")
    }
    fn default_trace_dir() -> PathBuf {
        PathBuf::from("traces")
    }
    fn default_bugs_dir() -> PathBuf {
        PathBuf::from("bugs")
    }
    fn default_minimums_dir() -> PathBuf {
        PathBuf::from("min")
    }
    fn default_tree_file() -> PathBuf {
        PathBuf::from("tree.txt")
    }
    fn default_timeout_ms() -> u64 {
        1000
    }
    fn default_true() -> bool {
        true
    }
    fn default_queue_len() -> usize {
        1000
    }
    fn default_tree_selection() -> TreeSelection {
        TreeSelection::Complete
    }
    fn default_max_bytes_reduction() -> usize {
        4
    }
    fn default_auto_termination() -> f64 {
        -1.0
    }
    fn default_report_examples() -> usize {
        5
    }

    /// Per-target hard timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wall-clock budget, or `None` when disabled.
    pub fn auto_termination(&self) -> Option<Duration> {
        if self.auto_termination_secs < 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(self.auto_termination_secs))
        }
    }

    /// Fan-out width for the runner pool. Each target typically spawns its
    /// own instrumented child, so only half the cores per target are claimed.
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        (cpus / (2 * self.targets.len().max(1))).max(1)
    }

    /// Fatal preflight checks; everything else downstream recovers locally.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        for target in &self.targets {
            if !target.executable.exists() {
                return Err(ConfigError::MissingTarget(target.executable.clone()));
            }
        }
        if !self.seed_dir.is_dir() {
            return Err(ConfigError::MissingSeedDir(self.seed_dir.clone()));
        }
        if self.max_bytes_reduction == 0 {
            return Err(ConfigError::ZeroReductionWidth);
        }
        if self.rough_desired_queue_len == 0 {
            return Err(ConfigError::ZeroQueueLen);
        }
        Ok(())
    }
}

/// Best-effort config path following platform conventions: prefer a local
/// `driftfuzz.toml`, then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("driftfuzz.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("driftfuzz").join("driftfuzz.toml");
    }
    PathBuf::from("driftfuzz.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(discover);
    load(&path)
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        target: "config",
        path = %path.display(),
        targets = config.targets.len(),
        timeout_ms = config.timeout_ms,
        queue_len = config.rough_desired_queue_len,
        "config_loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp
    }

    const MINIMAL: &str = r#"
        [[targets]]
        executable = "/bin/true"
    "#;

    #[test]
    fn defaults_fill_absent_fields() {
        let tmp = write_config(MINIMAL);
        let cfg = load(tmp.path()).unwrap();
        assert_eq!(cfg.seed_dir, PathBuf::from("seeds"));
        assert_eq!(cfg.timeout_ms, 1000);
        assert!(cfg.output_differentials_matter);
        assert!(!cfg.exit_statuses_matter);
        assert_eq!(cfg.rough_desired_queue_len, 1000);
        assert_eq!(cfg.fundamental_tree_selection, TreeSelection::Complete);
        assert_eq!(cfg.max_bytes_reduction, 4);
        assert_eq!(cfg.auto_termination(), None);
        assert!(cfg.bug_info);
        assert!(cfg.grammar_file.is_none());
        assert_eq!(cfg.targets.len(), 1);
    }

    #[test]
    fn parses_full_surface() {
        let tmp = write_config(
            r#"
            seed_dir = "corpus"
            timeout_ms = 250
            output_differentials_matter = false
            exit_statuses_matter = true
            rough_desired_queue_len = 64
            fundamental_tree_selection = 1
            grammar_reductions = true
            max_bytes_reduction = 8
            auto_termination_secs = 30.5
            grammar_file = "uri.toml"

            [[targets]]
            executable = "/bin/true"
            args = ["--strict"]
            qemu = true

            [[targets]]
            executable = "/bin/false"
            python_afl = true
            env = { PYTHONHASHSEED = "0" }
        "#,
        );
        let cfg = load(tmp.path()).unwrap();
        assert_eq!(cfg.seed_dir, PathBuf::from("corpus"));
        assert_eq!(cfg.timeout(), Duration::from_millis(250));
        assert!(!cfg.output_differentials_matter);
        assert!(cfg.exit_statuses_matter);
        assert_eq!(cfg.fundamental_tree_selection, TreeSelection::Valid);
        assert!(cfg.grammar_reductions);
        assert_eq!(cfg.max_bytes_reduction, 8);
        assert_eq!(cfg.auto_termination(), Some(Duration::from_secs_f64(30.5)));
        assert_eq!(cfg.grammar_file.as_deref(), Some(Path::new("uri.toml")));
        assert_eq!(cfg.targets[0].args, vec!["--strict"]);
        assert!(cfg.targets[0].qemu);
        assert!(cfg.targets[1].python_afl);
        assert_eq!(cfg.targets[1].env["PYTHONHASHSEED"], "0");
    }

    #[test]
    fn rejects_unknown_tree_selection() {
        let tmp = write_config("fundamental_tree_selection = 9\n[[targets]]\nexecutable = \"/bin/true\"\n");
        assert!(matches!(load(tmp.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn validate_requires_targets() {
        let tmp = write_config("seed_dir = \"/\"\n");
        let cfg = load(tmp.path()).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTargets)));
    }

    #[test]
    fn validate_requires_existing_executable_and_seed_dir() {
        let seeds = tempfile::tempdir().unwrap();
        let tmp = write_config(&format!(
            "seed_dir = {:?}\n[[targets]]\nexecutable = \"/nonexistent/target\"\n",
            seeds.path()
        ));
        let cfg = load(tmp.path()).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingTarget(_))));

        let tmp = write_config(
            "seed_dir = \"/nonexistent/seeds\"\n[[targets]]\nexecutable = \"/bin/true\"\n",
        );
        let cfg = load(tmp.path()).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingSeedDir(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            load(Path::new("__nonexistent_hopefully__.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let tmp = write_config(MINIMAL);
        let cfg = load(tmp.path()).unwrap();
        assert!(cfg.worker_count() >= 1);
    }
}
