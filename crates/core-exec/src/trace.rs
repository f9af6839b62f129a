//! Tracer output parsing.

use core_model::Trace;

/// Parse an afl-showmap trace file into an edge set.
///
/// The file is one `edge:count` pair per line. Hit counts are discarded (the
/// system tracks edge membership only) but a line must carry a parsable count
/// to be accepted; anything malformed is skipped rather than reported, since
/// a truncated trace from a killed child is a legitimate observation.
pub fn parse_trace(bytes: &[u8]) -> Trace {
    let mut trace = Trace::empty();
    for line in bytes.split(|b| *b == b'\n') {
        let Ok(line) = std::str::from_utf8(line) else {
            continue;
        };
        let Some((edge, count)) = line.trim().split_once(':') else {
            continue;
        };
        if count.parse::<u64>().is_err() {
            continue;
        }
        if let Ok(edge) = edge.parse::<u32>() {
            trace.insert(edge);
        }
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::Trace;

    #[test]
    fn parses_edge_count_lines() {
        let trace = parse_trace(b"1:1\n42:17\n100005:1\n");
        assert_eq!(trace, Trace::from_edges([1, 42, 100005]));
    }

    #[test]
    fn skips_malformed_lines() {
        let trace = parse_trace(b"1:1\ngarbage\n:\n7:also-garbage\n9:2\n\n");
        assert_eq!(trace, Trace::from_edges([1, 9]));
    }

    #[test]
    fn empty_output_is_an_empty_trace() {
        assert!(parse_trace(b"").is_empty());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let trace = parse_trace(b"3:1\n3:250\n");
        assert_eq!(trace.len(), 1);
    }
}
