//! Two-phase differential witness reduction.
//!
//! Both passes are guarded by the same predicate: a proposed reduction is
//! kept only if re-running it reproduces the original witness's resultprint.
//! Pass one peels grammar rules down to their canonical minimums (or deletes
//! them outright when reductions are disabled); pass two deletes byte windows
//! of descending width to a fixpoint per width. The reducer never grows the
//! candidate, never errors, and at worst returns the witness unchanged.

use core_exec::CoverageRunner;
use core_grammar::Grammar;
use core_model::Resultprint;
use std::collections::HashSet;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct ReduceOptions {
    /// Top width for the deletion pass; widths run from here down to 1.
    pub max_deletion_width: usize,
    /// Replace peeled rules with their canonical minimums instead of
    /// deleting them.
    pub grammar_reductions: bool,
    /// Whether stdout agreement is part of the resultprint.
    pub output_differentials: bool,
}

pub struct Reducer<'a, R: CoverageRunner> {
    runner: &'a R,
    grammar: Option<&'a Grammar>,
    options: ReduceOptions,
}

impl<'a, R: CoverageRunner> Reducer<'a, R> {
    pub fn new(runner: &'a R, grammar: Option<&'a Grammar>, options: ReduceOptions) -> Self {
        Self {
            runner,
            grammar,
            options,
        }
    }

    /// Shrink `witness` while preserving `want`. Monotone: the result is
    /// never longer than the input, and reducing a reduced witness returns
    /// it unchanged (up to runner flakiness).
    pub fn reduce(&self, witness: &[u8], want: Resultprint) -> Vec<u8> {
        let mut candidate = witness.to_vec();
        self.grammar_peel(&mut candidate, want);
        self.byte_deletion(&mut candidate, want);
        debug!(
            target: "reduce",
            from = witness.len(),
            to = candidate.len(),
            "reduction_complete"
        );
        candidate
    }

    /// A reduction attempt survives only if the runner reproduces the
    /// witness's resultprint; runner errors reject the attempt.
    fn preserves(&self, candidate: &[u8], want: Resultprint) -> bool {
        match self.runner.run(candidate) {
            Ok(outcome) => outcome.resultprint(self.options.output_differentials) == want,
            Err(err) => {
                trace!(target: "reduce", ?err, "attempt_rejected_on_runner_error");
                false
            }
        }
    }

    /// Replace each fired rule's capture with its canonical minimum (or
    /// delete it), restarting from the top after every accepted peel so
    /// later matches re-anchor. Each rule is peeled at most once; the pass
    /// ends when a full sweep over the fired rules accepts nothing.
    fn grammar_peel(&self, candidate: &mut Vec<u8>, want: Resultprint) {
        let Some(grammar) = self.grammar else {
            return;
        };
        let mut peeled: HashSet<String> = HashSet::new();
        'restart: loop {
            let Some(fired) = grammar.fired(candidate) else {
                return;
            };
            for rule in fired {
                if peeled.contains(&rule.name) {
                    continue;
                }
                let replacement: &[u8] = if self.options.grammar_reductions {
                    grammar.reduction(&rule.name).unwrap_or(b"")
                } else {
                    b""
                };
                if &candidate[rule.span.clone()] == replacement {
                    // Already minimal; no run needed.
                    peeled.insert(rule.name);
                    continue;
                }
                let mut attempt =
                    Vec::with_capacity(candidate.len() - rule.span.len() + replacement.len());
                attempt.extend_from_slice(&candidate[..rule.span.start]);
                attempt.extend_from_slice(replacement);
                attempt.extend_from_slice(&candidate[rule.span.end..]);
                if self.preserves(&attempt, want) {
                    trace!(target: "reduce", rule = rule.name.as_str(), "rule_peeled");
                    *candidate = attempt;
                    peeled.insert(rule.name);
                    continue 'restart;
                }
            }
            break;
        }
    }

    /// Descending multi-width deletion. At each width, scan left to right
    /// proposing removal of `[i, i+w)`; an accepted deletion does not
    /// advance `i`, and scans repeat until a full pass accepts nothing, so
    /// each width runs to its fixpoint before the width decrements.
    fn byte_deletion(&self, candidate: &mut Vec<u8>, want: Resultprint) {
        for width in (1..=self.options.max_deletion_width.max(1)).rev() {
            loop {
                let mut accepted_any = false;
                let mut index = 0;
                while index + width <= candidate.len() {
                    let mut attempt = Vec::with_capacity(candidate.len() - width);
                    attempt.extend_from_slice(&candidate[..index]);
                    attempt.extend_from_slice(&candidate[index + width..]);
                    if self.preserves(&attempt, want) {
                        *candidate = attempt;
                        accepted_any = true;
                    } else {
                        index += 1;
                    }
                }
                if !accepted_any {
                    break;
                }
            }
        }
    }
}
