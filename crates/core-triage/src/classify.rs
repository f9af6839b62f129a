//! Bugprint classification.
//!
//! A witness's traces are classified per target against the catalogue under
//! symmetric-difference distance, the classifications are expanded into a
//! cross-target difference profile, and the profile is hashed into the
//! bugprint. Classification walks the catalogue in file order and only a
//! strict improvement displaces the incumbent, so equal distances resolve to
//! the earliest entry and bugprints are reproducible given the same tree
//! file.

use crate::TraceCatalogue;
use core_model::{Bugprint, Digest, Trace, ZERO_DIGEST};
use std::collections::HashMap;
use tracing::debug;

/// Per target, the catalogue tag closest to the observed trace.
///
/// The running best starts at the empty tag with distance `|trace|` (its
/// distance from the empty trace, which every catalogue contains), so the
/// result is defined even for an empty catalogue, and an empty trace always
/// classifies as `""`.
pub fn classify(catalogue: &TraceCatalogue, traces: &[Trace]) -> Vec<String> {
    let mut classifications = Vec::with_capacity(traces.len());
    for (target, trace) in traces.iter().enumerate() {
        let mut best_tag = String::new();
        let mut best_distance = trace.len();
        for (tag, reference) in catalogue.tags(target) {
            let distance = reference.symmetric_distance(trace);
            if distance < best_distance {
                best_distance = distance;
                best_tag = tag.to_string();
            }
        }
        classifications.push(best_tag);
    }
    classifications
}

/// The targets×targets matrix of digests the bugprint hashes.
///
/// Diagonal entries are zero. Entry `(i, j)` digests
/// `catalogue[i][classification[j]] − traces[i]`: the coverage target `i`'s
/// own reference for the *peer's* shape would have hit that this input did
/// not. The raw trace is compared against a peer-derived reference even
/// though edge-id spaces are per-target; that collapse is what makes
/// unrelated witnesses of one defect agree.
pub fn difference_profile(
    catalogue: &TraceCatalogue,
    classifications: &[String],
    traces: &[Trace],
) -> Vec<Vec<Digest>> {
    let empty = Trace::empty();
    let mut profile = Vec::with_capacity(traces.len());
    for (i, trace) in traces.iter().enumerate() {
        let mut row = Vec::with_capacity(classifications.len());
        for (j, classification) in classifications.iter().enumerate() {
            if i == j {
                row.push(ZERO_DIGEST);
            } else {
                let reference = catalogue.get(i, classification).unwrap_or(&empty);
                row.push(reference.minus(trace).digest());
            }
        }
        profile.push(row);
    }
    profile
}

/// Hash the profile, rows then columns in target order.
pub fn bugprint(catalogue: &TraceCatalogue, traces: &[Trace]) -> (Vec<String>, Bugprint) {
    let classifications = classify(catalogue, traces);
    let profile = difference_profile(catalogue, &classifications, traces);
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(profile.len() as u64).to_le_bytes());
    for row in &profile {
        for cell in row {
            hasher.update(cell);
        }
    }
    (classifications, Bugprint::from_digest(*hasher.finalize().as_bytes()))
}

/// Diagnostic bookkeeping behind the `bug_info` switch: which distinct
/// classification tuples each bugprint has absorbed.
#[derive(Debug, Default)]
pub struct ClassificationLedger {
    classes: HashMap<Bugprint, Vec<Vec<String>>>,
}

impl ClassificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation; returns true when this classification tuple
    /// is new for the bugprint.
    pub fn observe(&mut self, bugprint: Bugprint, classifications: &[String]) -> bool {
        let entry = self.classes.entry(bugprint).or_default();
        if entry.iter().any(|known| known == classifications) {
            return false;
        }
        debug!(
            target: "triage.classify",
            %bugprint,
            classifications = ?classifications,
            "classification_observed"
        );
        entry.push(classifications.to_vec());
        true
    }

    pub fn classes(&self, bugprint: &Bugprint) -> &[Vec<String>] {
        self.classes.get(bugprint).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn trace(edges: &[u32]) -> Trace {
        Trace::from_edges(edges.iter().copied())
    }

    /// Two targets, disjoint edge-id spaces, three tags plus the empty one.
    fn catalogue() -> TraceCatalogue {
        let mut first = IndexMap::new();
        first.insert("SH".to_string(), trace(&[1, 2, 3]));
        first.insert("H".to_string(), trace(&[1, 2]));
        first.insert("S".to_string(), trace(&[3]));
        first.insert(String::new(), Trace::empty());

        let mut second = IndexMap::new();
        second.insert("SH".to_string(), trace(&[100, 101]));
        second.insert("H".to_string(), trace(&[100]));
        second.insert("S".to_string(), trace(&[101]));
        second.insert(String::new(), Trace::empty());

        TraceCatalogue::from_parts(vec![first, second])
    }

    #[test]
    fn exact_match_wins_with_distance_zero() {
        let cat = catalogue();
        let classifications = classify(&cat, &[trace(&[1, 2]), trace(&[100, 101])]);
        assert_eq!(classifications, ["H", "SH"]);
    }

    #[test]
    fn empty_traces_classify_as_the_empty_tag() {
        let cat = catalogue();
        let classifications = classify(&cat, &[Trace::empty(), Trace::empty()]);
        assert_eq!(classifications, ["", ""]);
    }

    #[test]
    fn ties_keep_the_earliest_catalogue_entry() {
        let cat = catalogue();
        // {2,3} is distance 1 from both SH {1,2,3} and S {3}; SH comes first
        // in file order and an equal distance never displaces it.
        let probe = trace(&[2, 3]);
        let classifications = classify(&cat, &[probe, Trace::empty()]);
        assert_eq!(classifications[0], "SH");
    }

    #[test]
    fn profile_diagonal_is_zero_and_off_diagonal_uses_peer_classification() {
        let cat = catalogue();
        let traces = [trace(&[1, 2]), trace(&[101])];
        let classifications = classify(&cat, &traces);
        assert_eq!(classifications, ["H", "S"]);
        let profile = difference_profile(&cat, &classifications, &traces);
        assert_eq!(profile[0][0], ZERO_DIGEST);
        assert_eq!(profile[1][1], ZERO_DIGEST);
        // (0, 1): catalogue[0]["S"] − traces[0] = {3} − {1,2} = {3}.
        assert_eq!(profile[0][1], trace(&[3]).digest());
        // (1, 0): catalogue[1]["H"] − traces[1] = {100} − {101} = {100}.
        assert_eq!(profile[1][0], trace(&[100]).digest());
    }

    #[test]
    fn bugprint_is_deterministic_and_order_sensitive() {
        let cat = catalogue();
        let traces = [trace(&[1, 2]), trace(&[101])];
        let (_, first) = bugprint(&cat, &traces);
        let (_, second) = bugprint(&cat, &traces);
        assert_eq!(first, second);

        let swapped = [trace(&[101]), trace(&[1, 2])];
        let (_, third) = bugprint(&cat, &swapped);
        assert_ne!(first, third, "target order is part of the identity");
    }

    #[test]
    fn all_empty_traces_produce_a_stable_profile() {
        let cat = catalogue();
        let traces = [Trace::empty(), Trace::empty()];
        let (classifications, print) = bugprint(&cat, &traces);
        assert_eq!(classifications, ["", ""]);
        // Every off-diagonal cell digests the empty difference.
        let profile = difference_profile(&cat, &classifications, &traces);
        assert_eq!(profile[0][1], Trace::empty().digest());
        let (_, again) = bugprint(&cat, &traces);
        assert_eq!(print, again);
    }

    #[test]
    fn ledger_tracks_distinct_classifications() {
        let cat = catalogue();
        let (classifications, print) = bugprint(&cat, &[trace(&[1, 2]), trace(&[101])]);
        let mut ledger = ClassificationLedger::new();
        assert!(ledger.observe(print, &classifications));
        assert!(!ledger.observe(print, &classifications));
        assert!(ledger.observe(print, &["SH".to_string(), "S".to_string()]));
        assert_eq!(ledger.classes(&print).len(), 2);
    }
}
