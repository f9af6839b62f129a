//! Bugprint inspection tool.
//!
//! Takes one directory of inputs, rebuilds the fundamental-trace catalogue,
//! and prints each file's bugprint. Inspection only: nothing is mutated,
//! reduced, or bucketed.

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_exec::{CoverageRunner, ShowmapRunner};
use core_triage::{TraceCatalogue, build_tree, bugprint, read_tree, write_tree};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "df-examine", version, about = "Print the bugprint of every input in a directory")]
struct Args {
    /// Directory of inputs to classify.
    dir: PathBuf,
    /// Optional configuration file path (overrides discovery of
    /// `driftfuzz.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("df-examine: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("{} is not a directory", args.dir.display());
    }
    let config = core_config::load_from(args.config)?;
    config.validate()?;
    std::fs::create_dir_all(&config.trace_dir).with_context(|| {
        format!("trace directory {} could not be created", config.trace_dir.display())
    })?;

    let runner = ShowmapRunner::new(&config);
    let tree = build_tree(config.fundamental_tree_selection);
    write_tree(&config.tree_file, &tree).with_context(|| {
        format!("tree file {} could not be written", config.tree_file.display())
    })?;
    let entries = read_tree(&config.tree_file)?;
    let catalogue = TraceCatalogue::build(
        &runner,
        &entries,
        &config.minimums_dir,
        config.targets.len(),
        config.worker_count(),
    )
    .context("fundamental-trace indexing failed")?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&args.dir)
        .with_context(|| format!("{} could not be read", args.dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in &paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("{} could not be read", path.display()))?;
        let outcome = match runner.run(&bytes) {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("df-examine: {}: {err}", path.display());
                continue;
            }
        };
        let (classifications, print) = bugprint(&catalogue, &outcome.traces);
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        println!(
            "{}: {print} [{}]",
            name.as_deref().unwrap_or("?"),
            classifications.join(", ")
        );
    }
    Ok(())
}
