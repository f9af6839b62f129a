//! Single-step input mutation.
//!
//! One call is one mutation: the pool of applicable operators is assembled
//! from the input's length and grammar availability, one operator is drawn
//! uniformly, and it is applied once. Byte operators work on arbitrary byte
//! strings; the grammar operator fires only when the input matches the
//! top-level grammar and replaces one fired rule's capture with a freshly
//! sampled instance of that rule.

use core_grammar::{FiredRule, Grammar};
use rand::Rng;
use rand::RngExt;
use std::sync::Arc;

/// One applicable edit, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a uniformly random byte at a uniformly random position.
    ByteInsert,
    /// Overwrite one byte with a uniformly random byte.
    ByteChange,
    /// Remove one byte.
    ByteDelete,
    /// Replace this fired rule's capture with a random instance of the rule.
    GrammarSubstitute(FiredRule),
}

pub struct Mutator {
    grammar: Option<Arc<Grammar>>,
}

impl Mutator {
    pub fn new(grammar: Option<Arc<Grammar>>) -> Self {
        Self { grammar }
    }

    /// The operators applicable to `input`. `ByteInsert` is always present;
    /// changing needs a byte, deleting needs two (an input never shrinks to
    /// empty by deletion), and the grammar arm needs a match with at least
    /// one fired rule the grammar can regenerate.
    fn pool<R: Rng + ?Sized>(&self, input: &[u8], rng: &mut R) -> Vec<Mutation> {
        let mut pool = vec![Mutation::ByteInsert];
        if !input.is_empty() {
            pool.push(Mutation::ByteChange);
        }
        if input.len() >= 2 {
            pool.push(Mutation::ByteDelete);
        }
        if let Some(grammar) = &self.grammar {
            if let Some(mut fired) = grammar.fired(input) {
                fired.retain(|f| grammar.has_rule(&f.name));
                if !fired.is_empty() {
                    let pick = fired.swap_remove(rng.random_range(0..fired.len()));
                    pool.push(Mutation::GrammarSubstitute(pick));
                }
            }
        }
        pool
    }

    /// Apply exactly one uniformly chosen mutation.
    pub fn mutate<R: Rng + ?Sized>(&self, input: &[u8], rng: &mut R) -> Vec<u8> {
        let pool = self.pool(input, rng);
        let chosen = pool[rng.random_range(0..pool.len())].clone();
        self.apply(&chosen, input, rng)
    }

    /// Dispatch one operator. Public so callers (and tests) can drive a
    /// specific edit rather than a sampled one.
    pub fn apply<R: Rng + ?Sized>(&self, mutation: &Mutation, input: &[u8], rng: &mut R) -> Vec<u8> {
        match mutation {
            Mutation::ByteInsert => {
                let index = rng.random_range(0..=input.len());
                let mut out = Vec::with_capacity(input.len() + 1);
                out.extend_from_slice(&input[..index]);
                out.push(rng.random::<u8>());
                out.extend_from_slice(&input[index..]);
                out
            }
            Mutation::ByteChange => {
                let mut out = input.to_vec();
                if !out.is_empty() {
                    let index = rng.random_range(0..out.len());
                    out[index] = rng.random::<u8>();
                }
                out
            }
            Mutation::ByteDelete => {
                let mut out = input.to_vec();
                if !out.is_empty() {
                    out.remove(rng.random_range(0..out.len()));
                }
                out
            }
            Mutation::GrammarSubstitute(fired) => {
                let Some(grammar) = &self.grammar else {
                    return input.to_vec();
                };
                let Some(instance) = grammar.random_instance(&fired.name, rng) else {
                    return input.to_vec();
                };
                let mut out = Vec::with_capacity(
                    input.len() - fired.span.len() + instance.len(),
                );
                out.extend_from_slice(&input[..fired.span.start]);
                out.extend_from_slice(instance.as_bytes());
                out.extend_from_slice(&input[fired.span.end..]);
                out
            }
        }
    }
}
