//! Ordered parallel fan-out over a coverage runner.
//!
//! The fuzz loop matches observations back to inputs positionally, so result
//! delivery must follow submission order. Workers pull `(index, input)` jobs
//! from a shared channel and send back `(index, result)`; the coordinator
//! reorders by index before returning. An unordered pool would silently
//! mis-align witnesses with their inputs.

use crate::{CoverageRunner, ExecError};
use core_model::ExecOutcome;
use crossbeam_channel as channel;
use tracing::debug;

/// Run every input through `runner` on up to `workers` threads, returning
/// results in submission order.
pub fn run_batch<R: CoverageRunner>(
    runner: &R,
    inputs: &[Vec<u8>],
    workers: usize,
) -> Vec<Result<ExecOutcome, ExecError>> {
    if inputs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, inputs.len());
    debug!(target: "exec.pool", inputs = inputs.len(), workers, "batch_start");

    let (job_tx, job_rx) = channel::unbounded::<(usize, &[u8])>();
    for job in inputs.iter().map(Vec::as_slice).enumerate() {
        // Unbounded channel: send cannot fail while the receiver lives.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (result_tx, result_rx) = channel::unbounded();
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((index, input)) = job_rx.recv() {
                    let _ = result_tx.send((index, runner.run(input)));
                }
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<Result<ExecOutcome, ExecError>>> =
            (0..inputs.len()).map(|_| None).collect();
        while let Ok((index, result)) = result_rx.recv() {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(ExecError::WorkerLost)))
            .collect()
    })
}
