//! Shared data model for differential runs.
//!
//! One input produces one edge-coverage trace per target, plus an exit status
//! and (when output comparison is enabled) a captured stdout per target. The
//! tuple of traces, hashed, is the *fingerprint* the fuzz loop dedupes on; the
//! statuses and the stdout-agreement bit, hashed, form the *resultprint* the
//! reducer preserves. Both digests must be stable across processes, so they
//! are BLAKE3 over a length-prefixed canonical encoding rather than anything
//! derived from `std::hash`.

use std::collections::BTreeSet;
use std::fmt;

/// Control-flow edge identifier as reported by the tracer.
pub type Edge = u32;

/// Canonical 256-bit digest used for fingerprints, resultprints, bugprints,
/// and content-addressed witness filenames.
pub type Digest = [u8; 32];

/// The digest occupying the diagonal of a difference profile.
pub const ZERO_DIGEST: Digest = [0u8; 32];

fn hex(digest: &Digest) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Unordered set of edges hit during one execution of one target.
///
/// The empty trace stands for both "empty input" and "the target died before
/// instrumentation produced data"; the two are deliberately indistinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace(BTreeSet<Edge>);

impl Trace {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn from_edges<I: IntoIterator<Item = Edge>>(edges: I) -> Self {
        Self(edges.into_iter().collect())
    }

    pub fn insert(&mut self, edge: Edge) {
        self.0.insert(edge);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ascending edge iteration; the canonical order every digest relies on.
    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        self.0.iter().copied()
    }

    /// `|self △ other|`, the classifier's distance metric.
    pub fn symmetric_distance(&self, other: &Trace) -> usize {
        self.0.symmetric_difference(&other.0).count()
    }

    /// Set difference `self − other` (edges of `self` absent from `other`).
    pub fn minus(&self, other: &Trace) -> Trace {
        Trace(self.0.difference(&other.0).copied().collect())
    }

    /// Digest of the edge set: length prefix, then each edge little-endian.
    pub fn digest(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.0.len() as u64).to_le_bytes());
        for edge in &self.0 {
            hasher.update(&edge.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

impl FromIterator<Edge> for Trace {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Dedupe key of the fuzz loop: digest of the per-target trace tuple.
///
/// Positional: permuting target order produces a different fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Digest);

impl Fingerprint {
    pub fn as_bytes(&self) -> &Digest {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &hex(&self.0)[..16])
    }
}

/// Equivalence predicate of the reducer: digest of the normalized statuses
/// and, in output mode, the all-stdouts-equal bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resultprint(Digest);

impl fmt::Display for Resultprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for Resultprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resultprint({})", &hex(&self.0)[..16])
    }
}

/// Equivalence-class digest assigned to a reduced differential witness.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bugprint(Digest);

impl Bugprint {
    pub fn from_digest(digest: Digest) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &Digest {
        &self.0
    }
}

impl fmt::Display for Bugprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for Bugprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bugprint({})", &hex(&self.0)[..16])
    }
}

/// Everything one coverage-runner invocation observed for one input.
///
/// Vectors are positionally aligned with the configured targets and always
/// have the configured arity; a target that timed out or crashed before
/// tracing contributes an empty trace and its actual terminal status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub traces: Vec<Trace>,
    pub statuses: Vec<i32>,
    pub stdouts: Vec<Vec<u8>>,
}

impl ExecOutcome {
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.traces)
    }

    /// True when the targets did not all exit with the same status.
    pub fn statuses_disagree(&self) -> bool {
        self.statuses.windows(2).any(|w| w[0] != w[1])
    }

    /// True when the captured stdouts are not all byte-identical.
    pub fn stdouts_disagree(&self) -> bool {
        self.stdouts.windows(2).any(|w| w[0] != w[1])
    }

    /// Resultprint of this outcome under the given output mode.
    pub fn resultprint(&self, output_mode: bool) -> Resultprint {
        resultprint(&self.statuses, &self.stdouts, output_mode)
    }
}

/// Digest of a trace tuple. Pure: equal tuples always digest equally.
pub fn fingerprint(traces: &[Trace]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(traces.len() as u64).to_le_bytes());
    for trace in traces {
        hasher.update(&trace.digest());
    }
    Fingerprint(*hasher.finalize().as_bytes())
}

/// Collapse an exit status to the configured equivalence: raw codes when
/// `exit_statuses_matter`, zero/nonzero otherwise.
pub fn normalize_status(raw: i32, exit_statuses_matter: bool) -> i32 {
    if exit_statuses_matter { raw } else { i32::from(raw != 0) }
}

/// Resultprint over already-normalized statuses. In output mode the digest
/// also commits to whether every stdout agreed; the stdout bytes themselves
/// never enter the hash.
pub fn resultprint(statuses: &[i32], stdouts: &[Vec<u8>], output_mode: bool) -> Resultprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(statuses.len() as u64).to_le_bytes());
    for status in statuses {
        hasher.update(&status.to_le_bytes());
    }
    if output_mode {
        let all_equal = stdouts.windows(2).all(|w| w[0] == w[1]);
        hasher.update(&[u8::from(all_equal)]);
    }
    Resultprint(*hasher.finalize().as_bytes())
}

/// Content-addressed filename stem for a byte string (16 hex chars).
pub fn content_stem(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    hex(digest.as_bytes())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(edges: &[Edge]) -> Trace {
        Trace::from_edges(edges.iter().copied())
    }

    #[test]
    fn fingerprint_is_pure() {
        let traces = vec![trace(&[1, 2, 3]), trace(&[7])];
        assert_eq!(fingerprint(&traces), fingerprint(&traces));
        let again = vec![trace(&[3, 2, 1]), trace(&[7])];
        assert_eq!(fingerprint(&traces), fingerprint(&again), "edge order is canonical");
    }

    #[test]
    fn fingerprint_depends_on_target_order() {
        let ab = vec![trace(&[1]), trace(&[2])];
        let ba = vec![trace(&[2]), trace(&[1])];
        assert_ne!(fingerprint(&ab), fingerprint(&ba));
    }

    #[test]
    fn empty_and_singleton_traces_do_not_collide() {
        // Length prefixes keep [{}, {5}] distinct from [{5}, {}].
        let left = vec![Trace::empty(), trace(&[5])];
        let right = vec![trace(&[5]), Trace::empty()];
        assert_ne!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn symmetric_distance_counts_both_sides() {
        let a = trace(&[1, 2, 3]);
        let b = trace(&[3, 4]);
        assert_eq!(a.symmetric_distance(&b), 3);
        assert_eq!(a.symmetric_distance(&a), 0);
        assert_eq!(a.symmetric_distance(&Trace::empty()), 3);
    }

    #[test]
    fn minus_is_one_sided() {
        let a = trace(&[1, 2, 3]);
        let b = trace(&[2, 9]);
        assert_eq!(a.minus(&b), trace(&[1, 3]));
        assert_eq!(Trace::empty().minus(&a), Trace::empty());
    }

    #[test]
    fn status_normalization() {
        assert_eq!(normalize_status(0, false), 0);
        assert_eq!(normalize_status(2, false), 1);
        assert_eq!(normalize_status(139, false), 1);
        assert_eq!(normalize_status(2, true), 2);
    }

    #[test]
    fn resultprint_tracks_stdout_agreement_only_in_output_mode() {
        let statuses = [0, 0];
        let same = vec![b"x".to_vec(), b"x".to_vec()];
        let diff = vec![b"x".to_vec(), b"y".to_vec()];
        assert_ne!(
            resultprint(&statuses, &same, true),
            resultprint(&statuses, &diff, true)
        );
        assert_eq!(
            resultprint(&statuses, &same, false),
            resultprint(&statuses, &diff, false)
        );
    }

    #[test]
    fn outcome_disagreement_predicates() {
        let outcome = ExecOutcome {
            traces: vec![Trace::empty(), Trace::empty()],
            statuses: vec![0, 1],
            stdouts: vec![Vec::new(), Vec::new()],
        };
        assert!(outcome.statuses_disagree());
        assert!(!outcome.stdouts_disagree());
    }

    #[test]
    fn content_stem_is_short_stable_hex() {
        let stem = content_stem(b"s://h/p");
        assert_eq!(stem.len(), 16);
        assert_eq!(stem, content_stem(b"s://h/p"));
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
