//! Fundamental-tree construction.
//!
//! A tree entry is a short symbolic tag (one letter per URI component
//! present, in fixed component order) and the canonical minimal payload for
//! that shape. The `tag=payload` text file is the sole boundary between the
//! builder and the trace indexer; rebuilding writes identical bytes.

use core_config::TreeSelection;
use std::fs;
use std::io;
use std::path::Path;

/// The seven optional URI components in tag order, with their canonical
/// minimal fragments.
const COMPONENTS: [(&str, &str); 7] = [
    ("S", "s://"),
    ("U", "u@"),
    ("H", "h"),
    ("O", ":1"),
    ("P", "/p"),
    ("Q", "?q"),
    ("F", "#f"),
];

/// RFC-shaped authorities (host mandatory) for the valid-only tree.
const AUTHORITIES: [(&str, &str); 4] = [
    ("H", "h"),
    ("HO", "h:1"),
    ("UH", "u@h"),
    ("UHO", "u@h:1"),
];

/// Everything that may follow an authority, empty ending included.
const ENDINGS: [(&str, &str); 8] = [
    ("P", "/p"),
    ("PQ", "/p?q"),
    ("PQF", "/p?q#f"),
    ("PF", "/p#f"),
    ("", ""),
    ("Q", "?q"),
    ("QF", "?q#f"),
    ("F", "#f"),
];

/// Build the catalogue entries for `selection`, in the order they will be
/// written to (and later read from) the tree file.
pub fn build_tree(selection: TreeSelection) -> Vec<(String, String)> {
    match selection {
        TreeSelection::Complete => {
            // Iterative cartesian merge: each component doubles the tree,
            // letter branch ahead of the empty branch, so the fully loaded
            // tag comes first and the empty tag last.
            let mut running: Vec<(String, String)> = vec![(String::new(), String::new())];
            for (letter, payload) in COMPONENTS {
                let mut merged = Vec::with_capacity(running.len() * 2);
                for (tag, base) in &running {
                    merged.push((format!("{tag}{letter}"), format!("{base}{payload}")));
                    merged.push((tag.clone(), base.clone()));
                }
                running = merged;
            }
            running
        }
        TreeSelection::Valid => {
            let scheme_auth: Vec<(String, String)> = AUTHORITIES
                .iter()
                .map(|(tag, payload)| (format!("S{tag}"), format!("s://{payload}")))
                .collect();
            let mut tree = Vec::with_capacity(scheme_auth.len() * ENDINGS.len());
            for (ending_tag, ending) in ENDINGS {
                for (tag, payload) in &scheme_auth {
                    tree.push((format!("{tag}{ending_tag}"), format!("{payload}{ending}")));
                }
            }
            tree
        }
        TreeSelection::Empty => vec![(String::new(), String::new())],
    }
}

/// Write one `tag=payload` line per entry.
pub fn write_tree(path: &Path, entries: &[(String, String)]) -> io::Result<()> {
    let mut out = String::new();
    for (tag, payload) in entries {
        out.push_str(tag);
        out.push('=');
        out.push_str(payload);
        out.push('\n');
    }
    fs::write(path, out)
}

/// Read a tree file back into entries, preserving line order. A line
/// without `=` is a bare tag with an empty payload.
pub fn read_tree(path: &Path) -> io::Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(|line| {
            let line = line.trim();
            match line.split_once('=') {
                Some((tag, payload)) => (tag.to_string(), payload.to_string()),
                None => (line.to_string(), String::new()),
            }
        })
        .collect())
}
