//! Random-instance sampler for rule generator patterns.
//!
//! Generator patterns are a compact, generation-oriented subset of regex
//! syntax: literals, escapes, `[...]` classes with ranges, `(...)` groups,
//! `|` alternation, and the quantifiers `?`, `*`, `+`, `{m}`, `{m,n}`.
//! Unbounded quantifiers are sampled with a fixed cap so instances stay
//! short. The sampler draws uniformly at every choice point.

use rand::Rng;
use rand::RngExt;
use std::iter::Peekable;
use std::str::Chars;

/// Repetition cap substituted for `*`/`+` upper bounds.
const UNBOUNDED_REPEAT_CAP: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Concatenation of sub-patterns.
    Seq(Vec<Pattern>),
    /// Uniform choice between alternatives.
    Alt(Vec<Pattern>),
    Lit(char),
    /// Inclusive character ranges; a lone char is a single-char range.
    Class(Vec<(char, char)>),
    /// `.`: any printable ASCII character.
    Any,
    Repeat {
        inner: Box<Pattern>,
        min: usize,
        max: usize,
    },
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Pattern, String> {
        let mut chars = text.chars().peekable();
        let pattern = parse_alt(&mut chars)?;
        match chars.next() {
            None => Ok(pattern),
            Some(c) => Err(format!("unexpected '{c}'")),
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let mut out = String::new();
        self.generate_into(rng, &mut out);
        out
    }

    fn generate_into<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut String) {
        match self {
            Pattern::Seq(parts) => {
                for part in parts {
                    part.generate_into(rng, out);
                }
            }
            Pattern::Alt(alternatives) => {
                let pick = rng.random_range(0..alternatives.len());
                alternatives[pick].generate_into(rng, out);
            }
            Pattern::Lit(c) => out.push(*c),
            Pattern::Class(ranges) => {
                let total: u32 = ranges
                    .iter()
                    .map(|(lo, hi)| u32::from(*hi) - u32::from(*lo) + 1)
                    .sum();
                let mut pick = rng.random_range(0..total);
                for (lo, hi) in ranges {
                    let span = u32::from(*hi) - u32::from(*lo) + 1;
                    if pick < span {
                        // Ranges are validated to stay within char bounds.
                        if let Some(c) = char::from_u32(u32::from(*lo) + pick) {
                            out.push(c);
                        }
                        return;
                    }
                    pick -= span;
                }
            }
            Pattern::Any => {
                let code = rng.random_range(0x20u32..0x7f);
                if let Some(c) = char::from_u32(code) {
                    out.push(c);
                }
            }
            Pattern::Repeat { inner, min, max } => {
                let count = rng.random_range(*min..=*max);
                for _ in 0..count {
                    inner.generate_into(rng, out);
                }
            }
        }
    }
}

type Stream<'a> = Peekable<Chars<'a>>;

fn parse_alt(chars: &mut Stream<'_>) -> Result<Pattern, String> {
    let mut alternatives = vec![parse_seq(chars)?];
    while chars.peek() == Some(&'|') {
        chars.next();
        alternatives.push(parse_seq(chars)?);
    }
    if alternatives.len() == 1 {
        Ok(alternatives.pop().unwrap_or(Pattern::Seq(Vec::new())))
    } else {
        Ok(Pattern::Alt(alternatives))
    }
}

fn parse_seq(chars: &mut Stream<'_>) -> Result<Pattern, String> {
    let mut parts = Vec::new();
    while let Some(&c) = chars.peek() {
        if c == '|' || c == ')' {
            break;
        }
        let atom = parse_atom(chars)?;
        parts.push(parse_quantifier(chars, atom)?);
    }
    Ok(match parts.len() {
        1 => parts.pop().unwrap_or(Pattern::Seq(Vec::new())),
        _ => Pattern::Seq(parts),
    })
}

fn parse_atom(chars: &mut Stream<'_>) -> Result<Pattern, String> {
    match chars.next() {
        Some('(') => {
            let inner = parse_alt(chars)?;
            match chars.next() {
                Some(')') => Ok(inner),
                _ => Err("unclosed group".to_string()),
            }
        }
        Some('[') => parse_class(chars),
        Some('.') => Ok(Pattern::Any),
        Some('\\') => chars
            .next()
            .map(Pattern::Lit)
            .ok_or_else(|| "dangling escape".to_string()),
        Some(c @ ('?' | '*' | '+' | '{')) => Err(format!("quantifier '{c}' with nothing to repeat")),
        Some(c) => Ok(Pattern::Lit(c)),
        None => Err("empty atom".to_string()),
    }
}

fn parse_class(chars: &mut Stream<'_>) -> Result<Pattern, String> {
    let mut ranges = Vec::new();
    loop {
        let lo = match chars.next() {
            Some(']') if !ranges.is_empty() => return Ok(Pattern::Class(ranges)),
            Some('\\') => chars.next().ok_or("dangling escape in class")?,
            Some(']') => return Err("empty character class".to_string()),
            Some(c) => c,
            None => return Err("unclosed character class".to_string()),
        };
        if chars.peek() == Some(&'-') {
            chars.next();
            match chars.peek() {
                // Trailing '-' is a literal.
                Some(']') | None => {
                    ranges.push((lo, lo));
                    ranges.push(('-', '-'));
                }
                Some(_) => {
                    let hi = match chars.next() {
                        Some('\\') => chars.next().ok_or("dangling escape in class")?,
                        Some(c) => c,
                        None => return Err("unclosed character class".to_string()),
                    };
                    if hi < lo {
                        return Err(format!("inverted range {lo}-{hi}"));
                    }
                    ranges.push((lo, hi));
                }
            }
        } else {
            ranges.push((lo, lo));
        }
    }
}

fn parse_quantifier(chars: &mut Stream<'_>, atom: Pattern) -> Result<Pattern, String> {
    let (min, max) = match chars.peek() {
        Some('?') => {
            chars.next();
            (0, 1)
        }
        Some('*') => {
            chars.next();
            (0, UNBOUNDED_REPEAT_CAP)
        }
        Some('+') => {
            chars.next();
            (1, UNBOUNDED_REPEAT_CAP)
        }
        Some('{') => {
            chars.next();
            let mut spec = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => spec.push(c),
                    None => return Err("unclosed repetition".to_string()),
                }
            }
            let parse_bound =
                |s: &str| s.trim().parse::<usize>().map_err(|_| format!("bad repetition '{spec}'"));
            match spec.split_once(',') {
                None => {
                    let n = parse_bound(&spec)?;
                    (n, n)
                }
                Some((lo, hi)) => {
                    let min = parse_bound(lo)?;
                    let max = if hi.trim().is_empty() {
                        min.max(UNBOUNDED_REPEAT_CAP)
                    } else {
                        parse_bound(hi)?
                    };
                    if max < min {
                        return Err(format!("bad repetition '{spec}'"));
                    }
                    (min, max)
                }
            }
        }
        _ => return Ok(atom),
    };
    Ok(Pattern::Repeat {
        inner: Box::new(atom),
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn literals_and_escapes() {
        let pattern = Pattern::parse(r"ab\[c\\").unwrap();
        assert_eq!(pattern.generate(&mut rng()), "ab[c\\");
    }

    #[test]
    fn class_stays_in_ranges() {
        let pattern = Pattern::parse("[a-c0-2]").unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let s = pattern.generate(&mut rng);
            let c = s.chars().next().unwrap();
            assert!(('a'..='c').contains(&c) || ('0'..='2').contains(&c), "got {c}");
        }
    }

    #[test]
    fn alternation_hits_every_arm() {
        let pattern = Pattern::parse("foo|bar|baz").unwrap();
        let mut rng = rng();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(pattern.generate(&mut rng));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn bounded_repetition() {
        let pattern = Pattern::parse("x{2,4}").unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let n = pattern.generate(&mut rng).len();
            assert!((2..=4).contains(&n), "got length {n}");
        }
    }

    #[test]
    fn optional_and_star_respect_caps() {
        let pattern = Pattern::parse("a?b*").unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let s = pattern.generate(&mut rng);
            assert!(s.len() <= 1 + UNBOUNDED_REPEAT_CAP);
        }
    }

    #[test]
    fn groups_compose_with_quantifiers() {
        let pattern = Pattern::parse("(ab|cd){2}").unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            let s = pattern.generate(&mut rng);
            assert_eq!(s.len(), 4);
            for chunk in [&s[..2], &s[2..]] {
                assert!(chunk == "ab" || chunk == "cd");
            }
        }
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in ["(ab", "[", "[]", "a{", "a{2,1}", "*", r"a\"] {
            assert!(Pattern::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }
}
