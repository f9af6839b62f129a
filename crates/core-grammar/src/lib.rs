//! Grammar capability for grammar-aware mutation and reduction.
//!
//! The grammar is optional for a run: when no grammar file is configured (or
//! it fails to load), the mutator loses its rule-substitution arm and the
//! reducer skips its peel pass, nothing else changes. When present, the
//! capability exposes exactly three operations: match an input and report
//! which rules fired, generate a random instance of one rule, and look up a
//! rule's canonical minimal payload.
//!
//! A grammar file is TOML:
//!
//! ```toml
//! pattern = '(?P<scheme>[a-z][a-z0-9+.-]*://)?(?P<host>[a-z0-9.-]+)?'
//!
//! [rules.scheme]
//! generator = '[a-z][a-z0-9]{0,3}://'
//! reduction = 's://'
//!
//! [rules.host]
//! generator = '[a-z0-9]{1,8}(\.[a-z0-9]{1,8})*'
//! reduction = 'h'
//! ```
//!
//! `pattern` is anchor-free with one named group per rule; it is compiled
//! anchored at the start (`re.match` semantics). Rule iteration order is the
//! file's order.

use indexmap::IndexMap;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;
use tracing::warn;

mod sampler;
pub use sampler::Pattern;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("grammar file {} could not be read: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("grammar file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("grammar pattern does not compile: {0}")]
    Pattern(#[from] regex::Error),
    #[error("rule '{rule}' has a malformed generator: {reason}")]
    Generator { rule: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct GrammarFile {
    pattern: String,
    #[serde(default)]
    rules: IndexMap<String, RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    generator: String,
    #[serde(default)]
    reduction: String,
}

#[derive(Debug)]
struct Rule {
    generator: Pattern,
    reduction: Vec<u8>,
}

/// A rule of the top-level regex that matched with a non-empty capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredRule {
    pub name: String,
    /// Byte range of the capture within the (UTF-8) input.
    pub span: Range<usize>,
}

#[derive(Debug)]
pub struct Grammar {
    regex: Regex,
    rules: IndexMap<String, Rule>,
}

impl Grammar {
    pub fn load(path: &Path) -> Result<Grammar, GrammarError> {
        let content = fs::read_to_string(path).map_err(|source| GrammarError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Grammar, GrammarError> {
        let file: GrammarFile = toml::from_str(content)?;
        // The file's pattern is anchor-free; anchor it here so matching
        // follows `re.match` semantics (start of input, prefix match).
        let regex = Regex::new(&format!("^(?:{})", file.pattern))?;

        let mut rules = IndexMap::new();
        for (name, entry) in file.rules {
            let generator =
                Pattern::parse(&entry.generator).map_err(|reason| GrammarError::Generator {
                    rule: name.clone(),
                    reason,
                })?;
            rules.insert(
                name,
                Rule {
                    generator,
                    reduction: entry.reduction.into_bytes(),
                },
            );
        }

        for group in regex.capture_names().flatten() {
            if !rules.contains_key(group) {
                warn!(target: "grammar", rule = group, "pattern_group_without_rule_entry");
            }
        }

        Ok(Grammar { regex, rules })
    }

    /// Match `input` against the top-level regex and report every rule whose
    /// named group captured non-empty text, in rule order. `None` when the
    /// input is not UTF-8 or does not match at all.
    pub fn fired(&self, input: &[u8]) -> Option<Vec<FiredRule>> {
        let text = std::str::from_utf8(input).ok()?;
        let captures = self.regex.captures(text)?;
        let mut fired = Vec::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(capture) = captures.name(name) {
                if !capture.is_empty() {
                    fired.push(FiredRule {
                        name: name.to_string(),
                        span: capture.start()..capture.end(),
                    });
                }
            }
        }
        Some(fired)
    }

    /// Freshly sample an instance of `rule`'s sub-grammar.
    pub fn random_instance<R: Rng + ?Sized>(&self, rule: &str, rng: &mut R) -> Option<String> {
        self.rules.get(rule).map(|r| r.generator.generate(rng))
    }

    /// The canonical minimal payload for `rule`; empty means the rule may be
    /// removed outright.
    pub fn reduction(&self, rule: &str) -> Option<&[u8]> {
        self.rules.get(rule).map(|r| r.reduction.as_slice())
    }

    /// Rule names in file order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Whether `rule` has an entry (a pattern group alone is not enough).
    pub fn has_rule(&self, rule: &str) -> bool {
        self.rules.contains_key(rule)
    }
}
