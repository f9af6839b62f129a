//! Coverage-runner contract and the afl-showmap implementation.
//!
//! This crate is the only place real subprocesses appear. Everything above it
//! (the loop, the reducer, the catalogue indexer) talks to the
//! [`CoverageRunner`] trait, so tests drive those components with scripted
//! in-memory runners instead of child processes.

use core_model::ExecOutcome;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod pool;
mod showmap;
mod trace;

pub use pool::run_batch;
pub use showmap::{ShowmapRunner, showmap_command_line};
pub use trace::parse_trace;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("scratch directory {} could not be prepared: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("input file {} could not be written: {source}", path.display())]
    InputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker thread lost before returning a result")]
    WorkerLost,
}

/// The contract the fuzz loop, reducer and indexer consume: one input in,
/// one positionally-aligned observation tuple out.
///
/// Implementations must be total over arbitrary byte strings: a target that
/// crashes, times out, or yields no instrumentation data contributes an empty
/// trace and its actual terminal status rather than an error. `Err` is
/// reserved for infrastructure failures (scratch I/O); callers recover from
/// it locally.
pub trait CoverageRunner: Sync {
    fn run(&self, input: &[u8]) -> Result<ExecOutcome, ExecError>;
}

impl<R: CoverageRunner + ?Sized> CoverageRunner for &R {
    fn run(&self, input: &[u8]) -> Result<ExecOutcome, ExecError> {
        (**self).run(input)
    }
}
