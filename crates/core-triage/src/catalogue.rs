//! Fundamental-trace catalogue: per target, the coverage set of every
//! canonical minimal input.

use core_exec::{CoverageRunner, run_batch};
use core_model::Trace;
use indexmap::IndexMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Read-only after construction. Inner maps iterate in catalogue-file order,
/// which is what makes classifier tie-breaking (and therefore bugprints)
/// reproducible across runs; the empty tag is always present and maps to the
/// empty trace for every target.
#[derive(Debug, Clone)]
pub struct TraceCatalogue {
    per_target: Vec<IndexMap<String, Trace>>,
}

impl TraceCatalogue {
    /// Index the tree entries: write each payload under `minimums_dir`, run
    /// every payload through the coverage runner (fan-out over `workers`),
    /// and assemble `target -> tag -> trace`. Duplicate tags run once; the
    /// empty tag is bound to the empty trace unconditionally afterwards.
    pub fn build<R: CoverageRunner>(
        runner: &R,
        entries: &[(String, String)],
        minimums_dir: &Path,
        targets: usize,
        workers: usize,
    ) -> io::Result<TraceCatalogue> {
        fs::create_dir_all(minimums_dir)?;

        let mut unique: IndexMap<&str, &str> = IndexMap::new();
        for (tag, payload) in entries {
            unique.entry(tag.as_str()).or_insert(payload.as_str());
        }
        for (tag, payload) in &unique {
            fs::write(minimums_dir.join(format!("{tag}.input")), payload)?;
        }

        let inputs: Vec<Vec<u8>> = unique
            .values()
            .map(|payload| payload.as_bytes().to_vec())
            .collect();
        info!(
            target: "triage.catalogue",
            entries = inputs.len(),
            targets,
            workers,
            "indexing_fundamental_traces"
        );
        let results = run_batch(runner, &inputs, workers);

        let mut per_target: Vec<IndexMap<String, Trace>> =
            (0..targets).map(|_| IndexMap::new()).collect();
        for (tag, result) in unique.keys().zip(results) {
            let traces = match result {
                Ok(outcome) => outcome.traces,
                Err(err) => {
                    warn!(target: "triage.catalogue", tag, ?err, "catalogue_entry_failed");
                    vec![Trace::empty(); targets]
                }
            };
            for (target, map) in per_target.iter_mut().enumerate() {
                let trace = traces.get(target).cloned().unwrap_or_default();
                map.insert((*tag).to_string(), trace);
            }
        }
        for map in &mut per_target {
            // Overwrites in place when the file supplied "", preserving its
            // position; appends last otherwise.
            map.insert(String::new(), Trace::empty());
        }

        Ok(TraceCatalogue { per_target })
    }

    pub fn targets(&self) -> usize {
        self.per_target.len()
    }

    pub fn get(&self, target: usize, tag: &str) -> Option<&Trace> {
        self.per_target.get(target)?.get(tag)
    }

    /// Tags for one target, in catalogue-file order.
    pub fn tags(&self, target: usize) -> impl Iterator<Item = (&str, &Trace)> {
        self.per_target
            .get(target)
            .into_iter()
            .flat_map(|map| map.iter().map(|(tag, trace)| (tag.as_str(), trace)))
    }

    #[cfg(test)]
    pub(crate) fn from_parts(per_target: Vec<IndexMap<String, Trace>>) -> Self {
        Self { per_target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_exec::ExecError;
    use core_model::ExecOutcome;

    /// Two scripted targets: edges derived from payload bytes, the second
    /// target offset so the targets' edge-id spaces differ.
    struct ByteEdgeRunner;

    impl CoverageRunner for ByteEdgeRunner {
        fn run(&self, input: &[u8]) -> Result<ExecOutcome, ExecError> {
            let base: Trace = input.iter().map(|b| u32::from(*b)).collect();
            let offset: Trace = input.iter().map(|b| u32::from(*b) + 1000).collect();
            Ok(ExecOutcome {
                traces: vec![base, offset],
                statuses: vec![0, 0],
                stdouts: vec![Vec::new(), Vec::new()],
            })
        }
    }

    fn entries() -> Vec<(String, String)> {
        vec![
            ("SH".to_string(), "s://h".to_string()),
            ("H".to_string(), "h".to_string()),
            ("SH".to_string(), "duplicate-ignored".to_string()),
        ]
    }

    #[test]
    fn builds_per_target_maps_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let catalogue =
            TraceCatalogue::build(&ByteEdgeRunner, &entries(), dir.path(), 2, 2).unwrap();
        assert_eq!(catalogue.targets(), 2);

        let tags: Vec<&str> = catalogue.tags(0).map(|(tag, _)| tag).collect();
        assert_eq!(tags, ["SH", "H", ""], "file order, empty tag appended last");

        let sh0 = catalogue.get(0, "SH").unwrap();
        assert_eq!(*sh0, "s://h".bytes().map(u32::from).collect::<Trace>());
        let sh1 = catalogue.get(1, "SH").unwrap();
        assert!(sh1.iter().all(|edge| edge >= 1000), "second target offset");
    }

    #[test]
    fn empty_tag_is_always_the_empty_trace() {
        let dir = tempfile::tempdir().unwrap();
        let with_empty = vec![
            (String::new(), "not-actually-empty".to_string()),
            ("H".to_string(), "h".to_string()),
        ];
        let catalogue =
            TraceCatalogue::build(&ByteEdgeRunner, &with_empty, dir.path(), 2, 1).unwrap();
        for target in 0..2 {
            assert!(catalogue.get(target, "").unwrap().is_empty());
        }
        // Position preserved: "" was first in the file, so it stays first.
        let tags: Vec<&str> = catalogue.tags(0).map(|(tag, _)| tag).collect();
        assert_eq!(tags, ["", "H"]);
    }

    #[test]
    fn duplicate_tags_run_once_and_write_min_files() {
        let dir = tempfile::tempdir().unwrap();
        TraceCatalogue::build(&ByteEdgeRunner, &entries(), dir.path(), 2, 1).unwrap();
        let names: std::collections::BTreeSet<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains("SH.input"));
        assert!(names.contains("H.input"));
        assert_eq!(
            fs::read_to_string(dir.path().join("SH.input")).unwrap(),
            "s://h",
            "first occurrence wins"
        );
    }
}
