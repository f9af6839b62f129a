//! On-disk bug buckets.
//!
//! Every reduced differential witness lands in `bugs/<bugprint>/` as a pair
//! of content-addressed files: the original bytes (`.input`) and the reduced
//! form (`.reduction`). The tree is purged before a run and mutated only by
//! the coordinator. Bucket I/O failures are logged and skipped; the
//! in-memory tallies keep counting, so a counter is always at least its
//! bucket's file count.

use core_model::{Bugprint, content_stem};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Whether the targets disagreed in exit status or only in stdout. Exit
/// takes precedence when both differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferentialKind {
    ExitStatus,
    Output,
}

impl DifferentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferentialKind::ExitStatus => "exit-status",
            DifferentialKind::Output => "stdout",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BugRecord {
    pub count: u64,
    pub kind: DifferentialKind,
    /// Up to `max_examples` reduced witnesses, for the summary.
    pub examples: Vec<Vec<u8>>,
}

#[derive(Debug)]
pub struct BugBank {
    root: PathBuf,
    max_examples: usize,
    records: BTreeMap<Bugprint, BugRecord>,
}

impl BugBank {
    pub fn new(root: PathBuf, max_examples: usize) -> Self {
        Self {
            root,
            max_examples,
            records: BTreeMap::new(),
        }
    }

    /// Clear out every bucket (contents, then the bucket itself) and any
    /// stray files under the root, then recreate the empty root.
    pub fn purge(&self) -> io::Result<()> {
        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        } else {
            fs::create_dir_all(&self.root)?;
        }
        info!(target: "triage.bucket", root = %self.root.display(), "bug_tree_purged");
        Ok(())
    }

    /// Record one witness: bump the tally, remember the reduction as an
    /// example, and persist both forms. The tally is bumped before touching
    /// disk, so disk can lag the counter but never lead it.
    pub fn record(
        &mut self,
        bugprint: Bugprint,
        kind: DifferentialKind,
        witness: &[u8],
        reduced: &[u8],
    ) {
        let record = self.records.entry(bugprint).or_insert(BugRecord {
            count: 0,
            kind,
            examples: Vec::new(),
        });
        record.count += 1;
        if record.examples.len() < self.max_examples
            && !record.examples.iter().any(|e| e == reduced)
        {
            record.examples.push(reduced.to_vec());
        }

        if let Err(err) = self.persist(bugprint, witness, reduced) {
            error!(
                target: "triage.bucket",
                %bugprint,
                ?err,
                "witness_persist_failed"
            );
        }
    }

    fn persist(&self, bugprint: Bugprint, witness: &[u8], reduced: &[u8]) -> io::Result<()> {
        let bucket = self.bucket_dir(&bugprint);
        fs::create_dir_all(&bucket)?;
        fs::write(bucket.join(format!("{}.input", content_stem(witness))), witness)?;
        fs::write(
            bucket.join(format!("{}.reduction", content_stem(reduced))),
            reduced,
        )?;
        Ok(())
    }

    pub fn bucket_dir(&self, bugprint: &Bugprint) -> PathBuf {
        self.root.join(bugprint.to_string())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> impl Iterator<Item = (&Bugprint, &BugRecord)> {
        self.records.iter()
    }

    pub fn unique_bugprints(&self) -> usize {
        self.records.len()
    }

    pub fn total_recorded(&self) -> u64 {
        self.records.values().map(|r| r.count).sum()
    }

    pub fn count_by_kind(&self, kind: DifferentialKind) -> usize {
        self.records.values().filter(|r| r.kind == kind).count()
    }
}
