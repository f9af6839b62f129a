//! Witness triage: the fundamental-trace catalogue, the bugprint
//! classifier, the on-disk bug buckets, and the end-of-run report.
//!
//! The pipeline is built once at startup (tree file, then catalogue) and
//! consulted for every reduced differential witness: classify its traces
//! against the catalogue, hash the cross-target difference profile into a
//! bugprint, and persist the witness under `bugs/<bugprint>/`.

mod bucket;
mod catalogue;
mod classify;
mod report;
mod tree;

pub use bucket::{BugBank, BugRecord, DifferentialKind};
pub use catalogue::TraceCatalogue;
pub use classify::{ClassificationLedger, bugprint, classify, difference_profile};
pub use report::{RunReport, RunStats, Termination};
pub use tree::{build_tree, read_tree, write_tree};
