//! The generation-based fuzz loop.
//!
//! State lives in one coordinator-owned [`Campaign`]: the explored
//! fingerprint set, the pending queue, tallies, buckets. Workers run inputs
//! and return observations; only the coordinator touches loop state, and it
//! consumes results in submission order so witnesses match their inputs
//! positionally.
//!
//! Per generation: run the queue through the pool, dedupe by coverage
//! fingerprint, split fresh fingerprints into differentials (reduce,
//! classify, bucket) and mutation candidates, then refill the queue by
//! mutating candidates round-robin up to the soft cap. The run ends when no
//! candidates remain, when the wall-clock budget expires, or on Ctrl-C; the
//! budget and the interrupt flag are checked per consumed result.

use core_config::Config;
use core_exec::{CoverageRunner, run_batch};
use core_grammar::Grammar;
use core_model::{ExecOutcome, Fingerprint};
use core_mutate::Mutator;
use core_reduce::{ReduceOptions, Reducer};
use core_triage::{
    BugBank, ClassificationLedger, DifferentialKind, Termination, TraceCatalogue, bugprint,
};
use rand::SeedableRng;
use rand::rngs::{StdRng, SysRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

pub struct Campaign<'a, R: CoverageRunner> {
    runner: &'a R,
    config: &'a Config,
    grammar: Option<Arc<Grammar>>,
    mutator: Mutator,
    catalogue: Option<TraceCatalogue>,
    interrupted: Arc<AtomicBool>,
    rng: StdRng,
    explored: HashSet<Fingerprint>,
    pub stats: core_triage::RunStats,
    pub bank: BugBank,
    pub ledger: ClassificationLedger,
}

impl<'a, R: CoverageRunner> Campaign<'a, R> {
    pub fn new(
        runner: &'a R,
        config: &'a Config,
        grammar: Option<Arc<Grammar>>,
        catalogue: Option<TraceCatalogue>,
        bank: BugBank,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            runner,
            config,
            mutator: Mutator::new(grammar.clone()),
            grammar,
            catalogue,
            interrupted,
            rng: StdRng::try_from_rng(&mut SysRng).expect("failed to seed RNG from OS"),
            explored: HashSet::new(),
            stats: core_triage::RunStats::default(),
            bank,
            ledger: ClassificationLedger::new(),
        }
    }

    pub fn run(&mut self, seeds: Vec<Vec<u8>>) -> Termination {
        let deadline = self
            .config
            .auto_termination()
            .map(|budget| Instant::now() + budget);
        let mut queue = seeds;
        loop {
            if queue.is_empty() {
                return Termination::NoMoreMutationCandidates;
            }
            info!(
                target: "campaign",
                generation = self.stats.generations,
                queued = queue.len(),
                "generation_start"
            );

            let results = run_batch(self.runner, &queue, self.config.worker_count());
            let mut candidates: Vec<usize> = Vec::new();
            let mut differentials = 0u64;
            for (index, result) in results.into_iter().enumerate() {
                if let Some(reason) = self.should_stop(deadline) {
                    return reason;
                }
                self.stats.inputs_run += 1;
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(target: "campaign", ?err, "input_skipped_on_runner_error");
                        continue;
                    }
                };
                let fingerprint = outcome.fingerprint();
                if !self.explored.insert(fingerprint) {
                    // Nothing new under this input; it is dropped here and
                    // its scratch state is already gone.
                    continue;
                }
                self.stats.fingerprints_explored += 1;

                let exit_diff = outcome.statuses_disagree();
                let output_diff =
                    self.config.output_differentials_matter && outcome.stdouts_disagree();
                if exit_diff || output_diff {
                    differentials += 1;
                    let kind = if exit_diff {
                        self.stats.exit_differentials += 1;
                        DifferentialKind::ExitStatus
                    } else {
                        self.stats.output_differentials += 1;
                        DifferentialKind::Output
                    };
                    self.handle_differential(&queue[index], &outcome, kind);
                } else {
                    candidates.push(index);
                }
            }

            self.stats.generations += 1;
            info!(
                target: "campaign",
                generation = self.stats.generations,
                candidates = candidates.len(),
                differentials,
                explored = self.explored.len(),
                "generation_complete"
            );

            queue = self.refill(&queue, &candidates);
        }
    }

    fn should_stop(&self, deadline: Option<Instant>) -> Option<Termination> {
        if self.interrupted.load(Ordering::Relaxed) {
            return Some(Termination::KeyboardInterrupt);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Some(Termination::AutoTermination(self.config.auto_termination_secs));
            }
        }
        None
    }

    /// Reduce the witness, classify the reduced form, and bucket it. With
    /// `bug_info` off there is no catalogue and the differential is only
    /// tallied.
    fn handle_differential(&mut self, witness: &[u8], outcome: &ExecOutcome, kind: DifferentialKind) {
        let want = outcome.resultprint(self.config.output_differentials_matter);
        let options = ReduceOptions {
            max_deletion_width: self.config.max_bytes_reduction,
            grammar_reductions: self.config.grammar_reductions,
            output_differentials: self.config.output_differentials_matter,
        };
        let reducer = Reducer::new(self.runner, self.grammar.as_deref(), options);
        let reduced = reducer.reduce(witness, want);
        info!(
            target: "campaign",
            kind = kind.as_str(),
            witness_len = witness.len(),
            reduced_len = reduced.len(),
            "differential_found"
        );

        let Some(catalogue) = &self.catalogue else {
            return;
        };
        let reduced_outcome = match self.runner.run(&reduced) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(target: "campaign", ?err, "classification_skipped_on_runner_error");
                return;
            }
        };
        let (classifications, print) = bugprint(catalogue, &reduced_outcome.traces);
        self.ledger.observe(print, &classifications);
        self.bank.record(print, kind, witness, &reduced);
    }

    /// Mutate candidates round-robin until the soft cap is reached; the last
    /// pass may overshoot. No candidates means an empty queue, which ends
    /// the run.
    fn refill(&mut self, queue: &[Vec<u8>], candidates: &[usize]) -> Vec<Vec<u8>> {
        let mut next = Vec::new();
        if candidates.is_empty() {
            return next;
        }
        while next.len() < self.config.rough_desired_queue_len {
            for &index in candidates {
                next.push(self.mutator.mutate(&queue[index], &mut self.rng));
            }
        }
        next
    }
}
