//! driftfuzz entrypoint.
//!
//! Startup order: logging, panic hook, configuration (fatal on any
//! problem), grammar (optional), seeds, fundamental-trace catalogue (when
//! `bug_info` is on), then the campaign loop. Both normal completion and an
//! interrupted run exit 0 after emitting the summary; configuration and
//! usage errors exit 1 before the loop starts.

use anyhow::{Context, Result};
use clap::Parser;
use core_config::Config;
use core_exec::ShowmapRunner;
use core_grammar::Grammar;
use core_triage::{BugBank, RunReport, TraceCatalogue, build_tree, read_tree, write_tree};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod campaign;

use campaign::Campaign;

/// CLI arguments. The loop takes no positional arguments.
#[derive(Parser, Debug)]
#[command(name = "driftfuzz", version, about = "Differential coverage-guided fuzzer")]
struct Args {
    /// Optional configuration file path (overrides discovery of
    /// `driftfuzz.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("driftfuzz.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "driftfuzz.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_err) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(target: "runtime.panic", ?info, "panic");
        default_panic(info);
    }));
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "runtime", error = %format!("{err:#}"), "fatal");
            eprintln!("driftfuzz: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = core_config::load_from(args.config)?;
    config.validate()?;
    std::fs::create_dir_all(&config.trace_dir).with_context(|| {
        format!("trace directory {} could not be created", config.trace_dir.display())
    })?;

    let grammar = load_grammar(&config);
    let seeds = load_seeds(&config.seed_dir)?;
    let runner = ShowmapRunner::new(&config);

    let catalogue = if config.bug_info {
        Some(build_catalogue(&runner, &config)?)
    } else {
        None
    };
    let bank = BugBank::new(config.bugs_dir.clone(), config.report_examples);
    if config.bug_info {
        bank.purge().with_context(|| {
            format!("bug tree {} could not be purged", config.bugs_dir.display())
        })?;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            warn!(target: "runtime", ?err, "ctrl_c_handler_unavailable");
        }
    }

    let started = Instant::now();
    let mut campaign = Campaign::new(&runner, &config, grammar, catalogue, bank, interrupted);
    let termination = campaign.run(seeds);
    info!(target: "runtime", reason = %termination, "run_complete");

    RunReport {
        termination,
        wall_clock: started.elapsed(),
        stats: campaign.stats,
        bank: config.bug_info.then_some(&campaign.bank),
    }
    .emit();
    Ok(())
}

/// Grammar absence is non-fatal: the mutator loses its substitution arm and
/// the reducer its peel pass for this run.
fn load_grammar(config: &Config) -> Option<Arc<Grammar>> {
    let path = config.grammar_file.as_ref()?;
    match Grammar::load(path) {
        Ok(grammar) => {
            info!(
                target: "runtime",
                path = %path.display(),
                rules = grammar.rule_names().count(),
                "grammar_loaded"
            );
            Some(Arc::new(grammar))
        }
        Err(err) => {
            warn!(
                target: "runtime",
                path = %path.display(),
                %err,
                "grammar_unavailable_mutations_disabled"
            );
            None
        }
    }
}

/// Seed inputs, in filename order so runs are reproducible.
fn load_seeds(seed_dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(seed_dir)
        .with_context(|| format!("seed directory {} could not be read", seed_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut seeds = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = std::fs::read(path)
            .with_context(|| format!("seed {} could not be read", path.display()))?;
        seeds.push(bytes);
    }
    info!(target: "runtime", count = seeds.len(), "seeds_loaded");
    Ok(seeds)
}

/// Build the fundamental tree, write it through its file (the sole boundary
/// between builder and indexer), and index every entry's traces.
fn build_catalogue(runner: &ShowmapRunner, config: &Config) -> Result<TraceCatalogue> {
    let tree = build_tree(config.fundamental_tree_selection);
    write_tree(&config.tree_file, &tree).with_context(|| {
        format!("tree file {} could not be written", config.tree_file.display())
    })?;
    let entries = read_tree(&config.tree_file).with_context(|| {
        format!("tree file {} could not be read back", config.tree_file.display())
    })?;
    TraceCatalogue::build(
        runner,
        &entries,
        &config.minimums_dir,
        config.targets.len(),
        config.worker_count(),
    )
    .context("fundamental-trace indexing failed")
}
