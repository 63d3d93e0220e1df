// src/data/pattern.rs

//! Implement [`PatternSpec`], [`Pattern`], and [`PatternSet`].
//!
//! Patterns are supplied fresh with every request and are never persisted.

use crate::common::PatternIndex;

use std::collections::HashSet;
use std::fmt;

use ::regex::{Regex, RegexSet};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// An uncompiled pattern as the caller supplied it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PatternSpec {
    /// Caller-assigned, echoed back unchanged.
    pub index: PatternIndex,
    pub expression: String,
}

impl PatternSpec {
    pub fn new(
        index: PatternIndex,
        expression: &str,
    ) -> PatternSpec {
        PatternSpec {
            index,
            expression: String::from(expression),
        }
    }
}

impl fmt::Display for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:?}", self.index, self.expression)
    }
}

pub type PatternSpecs = Vec<PatternSpec>;

/// A pattern that failed to compile, or that reused an index already taken
/// within the same request.
#[derive(Clone, Debug, Eq, PartialEq, ::thiserror::Error)]
#[error("invalid pattern at index {index}: {message}")]
pub struct InvalidPattern {
    pub index: PatternIndex,
    pub message: String,
}

/// A compiled [`PatternSpec`].
#[derive(Clone, Debug)]
pub struct Pattern {
    pub index: PatternIndex,
    regex: Regex,
}

impl Pattern {
    pub fn compile(spec: &PatternSpec) -> Result<Pattern, InvalidPattern> {
        match Regex::new(&spec.expression) {
            Ok(regex) => Ok(Pattern {
                index: spec.index,
                regex,
            }),
            Err(err) => Err(InvalidPattern {
                index: spec.index,
                message: err.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(
        &self,
        line: &str,
    ) -> bool {
        self.regex.is_match(line)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PatternSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All patterns of one request, tested together against each line.
///
/// A line matches the set if it matches at least one pattern. An empty set
/// matches nothing.
#[derive(Clone, Debug)]
pub struct PatternSet {
    /// In request order.
    patterns: Vec<Pattern>,
    /// Same order as `patterns`; one pass over a line tests all of them.
    regexset: RegexSet,
}

impl PatternSet {
    /// Compile every pattern of a request.
    ///
    /// All-or-nothing: the first pattern that fails to compile, or that
    /// repeats an index, rejects the whole set.
    pub fn compile(specs: &[PatternSpec]) -> Result<PatternSet, InvalidPattern> {
        defn!("({} patterns)", specs.len());
        let mut patterns: Vec<Pattern> = Vec::with_capacity(specs.len());
        let mut seen: HashSet<PatternIndex> = HashSet::with_capacity(specs.len());
        for spec in specs.iter() {
            if !seen.insert(spec.index) {
                defx!("duplicate index {}", spec.index);
                return Err(InvalidPattern {
                    index: spec.index,
                    message: String::from("duplicate pattern index"),
                });
            }
            let pattern = match Pattern::compile(spec) {
                Ok(val) => val,
                Err(err) => {
                    defx!("{}", err);
                    return Err(err);
                }
            };
            patterns.push(pattern);
        }
        let regexset = match RegexSet::new(patterns.iter().map(|p| p.as_str())) {
            Ok(val) => val,
            // every member compiled alone, so only a set-wide size limit can
            // fail here; blame the last pattern
            Err(err) => {
                let index: PatternIndex = specs.last().map(|s| s.index).unwrap_or_default();
                defx!("RegexSet::new failed {}", err);
                return Err(InvalidPattern {
                    index,
                    message: err.to_string(),
                });
            }
        };
        defx!("compiled {} patterns", patterns.len());

        Ok(PatternSet { patterns, regexset })
    }

    /// `true` if `line` matches at least one pattern.
    pub fn matches(
        &self,
        line: &str,
    ) -> bool {
        self.regexset.is_match(line)
    }

    /// Indices of every pattern matching `line`, ascending.
    /// Empty if nothing matched.
    pub fn matching_indices(
        &self,
        line: &str,
    ) -> Vec<PatternIndex> {
        let mut indices: Vec<PatternIndex> = self
            .regexset
            .matches(line)
            .into_iter()
            .map(|at| self.patterns[at].index)
            .collect();
        indices.sort_unstable();

        indices
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }
}
