// src/data/matchresult.rs

//! Implement [`MatchedLine`] and [`MatchResult`].

use crate::common::{Count, FPath, FileOffset, PatternIndex, SubscriptionId};
use crate::data::pattern::PatternSpecs;

use std::fmt;

/// A line that matched at least one pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatchedLine {
    /// Indices of the patterns that matched, ascending. Never empty.
    pub indices: Vec<PatternIndex>,
    /// Decoded line text without its line terminator.
    pub text: String,
    /// File offset of the first byte of the line.
    pub offset: FileOffset,
}

/// Renders as `<indices>;<text>`, e.g. `0 2;disk full`.
impl fmt::Display for MatchedLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for index in self.indices.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", index)?;
            first = false;
        }
        write!(f, ";{}", self.text)
    }
}

pub type MatchedLines = Vec<MatchedLine>;

/// Result of one tail pass for one subscription.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MatchResult {
    pub file_path: FPath,
    pub subscription_id: SubscriptionId,
    /// The request's patterns, echoed unchanged.
    pub patterns: PatternSpecs,
    /// In file order.
    pub matched_lines: MatchedLines,
    /// The pass stopped before the end of the file; call again.
    pub was_partial_read: bool,
    /// The file at the path was replaced since the last pass.
    pub rotated: bool,
    /// The file shrank below the stored offset since the last pass.
    pub truncated: bool,
    /// Offset the pass started reading at.
    pub start_offset: FileOffset,
    /// Offset persisted for the next pass.
    pub new_offset: FileOffset,
    /// Complete lines read this pass, matched or not.
    pub lines_read: Count,
}

impl MatchResult {
    /// An empty result for a pass that read nothing.
    pub fn new_empty(
        file_path: &str,
        subscription_id: &str,
        patterns: PatternSpecs,
    ) -> MatchResult {
        MatchResult {
            file_path: FPath::from(file_path),
            subscription_id: SubscriptionId::from(subscription_id),
            patterns,
            ..Default::default()
        }
    }

    pub fn matched_line_count(&self) -> usize {
        self.matched_lines.len()
    }

    /// Matched line texts in file order, as carried on the wire.
    pub fn matched_texts(&self) -> Vec<String> {
        self.matched_lines
            .iter()
            .map(|ml| ml.text.clone())
            .collect()
    }

    /// Bytes consumed by this pass.
    pub const fn bytes_consumed(&self) -> u64 {
        self.new_offset.saturating_sub(self.start_offset)
    }
}
