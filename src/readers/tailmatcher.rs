// src/readers/tailmatcher.rs

//! Implements a [`TailMatcher`], the single entry point of one tail pass:
//! load the subscription's state, open the file, read new lines under a byte
//! budget, match them, persist the new offset.
//!
//! ```text
//!   StateStore::lock ─► StateStore::load ─► FileSession::open
//!                                               │
//!                       PatternSet::matching_indices ◄─ FileSession::read_lines
//!                                               │
//!                       StateStore::save ◄──────┘ ─► MatchResult
//! ```

use crate::common::{
    Count, FPath, FileOffset, PatternIndex, BYTE_BUDGET_DEFAULT, EXIT_FILE_NOT_FOUND,
    EXIT_FILE_UNREADABLE, EXIT_INVALID_PATTERN, EXIT_UNEXPECTED,
};
use crate::data::matchresult::{MatchResult, MatchedLine, MatchedLines};
use crate::data::pattern::{InvalidPattern, PatternSet, PatternSpec};
use crate::data::readstate::{ReadState, Subscription};
#[cfg(any(debug_assertions, test))]
use crate::debug::printers::str_to_String_noraw;
use crate::readers::filesession::{FileSession, ReadLinesResult};
use crate::marshal::codec::FRAME_PAYLOAD_MAX;
use crate::readers::statestore::StateStore;

use std::fmt;
use std::io::ErrorKind;

use ::encoding_rs::{Encoding, UTF_8};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TailError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure of one tail pass.
///
/// A corrupt state record is not among these; it loads as offset 0.
#[derive(Debug, ::thiserror::Error)]
pub enum TailError {
    /// Reported to the caller as zero matches; the caller retries next poll.
    #[error("log file not found {0:?}")]
    FileNotFound(FPath),
    #[error("log file unreadable {0:?}: {1}")]
    FileUnreadable(FPath, #[source] std::io::Error),
    /// Rejects the whole request; nothing was read and no state changed.
    #[error("invalid pattern at index {index}: {message}")]
    InvalidPattern {
        index: PatternIndex,
        message: String,
    },
    #[error("state store: {0}")]
    State(#[source] std::io::Error),
}

impl From<InvalidPattern> for TailError {
    fn from(err: InvalidPattern) -> TailError {
        TailError::InvalidPattern {
            index: err.index,
            message: err.message,
        }
    }
}

impl TailError {
    /// Process exit code of the `ltm` process for this error.
    pub const fn exit_code(&self) -> u8 {
        match self {
            TailError::FileNotFound(_) => EXIT_FILE_NOT_FOUND,
            TailError::InvalidPattern { .. } => EXIT_INVALID_PATTERN,
            TailError::FileUnreadable(..) => EXIT_FILE_UNREADABLE,
            TailError::State(_) => EXIT_UNEXPECTED,
        }
    }
}

/// Default of [`EngineConfig::max_matched_bytes`], half a frame; the rest
/// of the frame is left for the echoed request fields.
pub const MATCHED_BYTES_MAX_DEFAULT: u64 = (FRAME_PAYLOAD_MAX / 2) as u64;

/// Bytes a matched line takes in a response's `TextSeq`.
pub const fn matched_line_wire_sz(text: &str) -> u64 {
    4 + text.len() as u64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EngineConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings of a [`TailMatcher`].
#[derive(Clone, Copy)]
pub struct EngineConfig {
    /// Bytes one pass may consume before it stops with a partial read.
    pub byte_budget: u64,
    /// Stop a pass after this many matched lines.
    pub max_matched_lines: Option<Count>,
    /// Stop a pass before its matched lines would take more than this many
    /// bytes in a response. Decoded text can outgrow the bytes read, so the
    /// byte budget alone does not bound the response. The first matched line
    /// of a pass is always taken.
    pub max_matched_bytes: u64,
    /// Encoding of the log text.
    pub encoding: &'static Encoding,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            byte_budget: BYTE_BUDGET_DEFAULT,
            max_matched_lines: None,
            max_matched_bytes: MATCHED_BYTES_MAX_DEFAULT,
            encoding: UTF_8,
        }
    }
}

impl EngineConfig {
    pub fn with_byte_budget(
        mut self,
        byte_budget: u64,
    ) -> EngineConfig {
        self.byte_budget = byte_budget;
        self
    }

    pub fn with_max_matched_lines(
        mut self,
        max_matched_lines: Option<Count>,
    ) -> EngineConfig {
        self.max_matched_lines = max_matched_lines;
        self
    }

    pub fn with_max_matched_bytes(
        mut self,
        max_matched_bytes: u64,
    ) -> EngineConfig {
        self.max_matched_bytes = max_matched_bytes;
        self
    }

    pub fn with_encoding(
        mut self,
        encoding: &'static Encoding,
    ) -> EngineConfig {
        self.encoding = encoding;
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("byte_budget", &self.byte_budget)
            .field("max_matched_lines", &self.max_matched_lines)
            .field("max_matched_bytes", &self.max_matched_bytes)
            .field("encoding", &self.encoding.name())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TailMatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs tail passes against one [`StateStore`].
#[derive(Debug)]
pub struct TailMatcher {
    store: StateStore,
    config: EngineConfig,
}

impl TailMatcher {
    pub fn new(
        store: StateStore,
        config: EngineConfig,
    ) -> TailMatcher {
        defñ!("({}, {:?})", store, config);
        TailMatcher { store, config }
    }

    pub const fn store(&self) -> &StateStore {
        &self.store
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass of `subscription_id` over `file_path`.
    ///
    /// On `Ok` the subscription's state is advanced to
    /// [`MatchResult::new_offset`]. On `Err` the state is unchanged.
    /// While [`MatchResult::was_partial_read`] is `true` the caller should
    /// call again.
    pub fn tail(
        &self,
        file_path: &FPath,
        subscription_id: &str,
        patterns: &[PatternSpec],
    ) -> Result<MatchResult, TailError> {
        defn!("({:?}, {:?}, {} patterns)", file_path, subscription_id, patterns.len());
        let patternset = match PatternSet::compile(patterns) {
            Ok(val) => val,
            Err(err) => {
                defx!("{}", err);
                return Err(err.into());
            }
        };
        let subscription = Subscription::new(subscription_id, file_path);
        let _lock = self
            .store
            .lock(&subscription)
            .map_err(TailError::State)?;
        let state: ReadState = self.store.load(&subscription);
        let mut session = match FileSession::open(file_path, &state, self.config.encoding) {
            Ok(val) => val,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                defx!("file not found {:?}", file_path);
                return Err(TailError::FileNotFound(file_path.clone()));
            }
            Err(err) => {
                defx!("open error {}", err);
                return Err(TailError::FileUnreadable(file_path.clone(), err));
            }
        };

        let mut result = MatchResult::new_empty(file_path, subscription_id, patterns.to_vec());
        result.rotated = session.rotated();
        result.truncated = session.truncated();
        result.start_offset = session.effective_offset();

        if session.start().is_skip_to_end() {
            // a pending skip-to-end reset consumes everything present now
            result.new_offset = session.effective_offset();
            self.save(&state, session.effective_offset(), &session)?;
            defx!("skipped to end {}", result.new_offset);
            return Ok(result);
        }

        let read: ReadLinesResult = session
            .read_lines(self.config.byte_budget)
            .map_err(|err| TailError::FileUnreadable(file_path.clone(), err))?;
        let (matched_lines, new_offset, was_partial_read) = self.match_lines(&patternset, &read);
        result.lines_read = read
            .lines
            .iter()
            .take_while(|line| line.fileoffset < new_offset)
            .count() as Count;
        result.matched_lines = matched_lines;
        result.new_offset = new_offset;
        result.was_partial_read = was_partial_read;

        self.save(&state, new_offset, &session)?;
        defx!(
            "matched {}, new_offset {}, was_partial_read {}",
            result.matched_line_count(),
            result.new_offset,
            result.was_partial_read
        );

        Ok(result)
    }

    /// Match `read`'s lines in file order, honoring the matched-line cap and
    /// the matched-bytes cap.
    /// Returns the matched lines, the offset to persist, and whether the pass
    /// is partial.
    fn match_lines(
        &self,
        patternset: &PatternSet,
        read: &ReadLinesResult,
    ) -> (MatchedLines, FileOffset, bool) {
        let mut matched_lines: MatchedLines = MatchedLines::new();
        let mut matched_bytes: u64 = 0;
        for (at, line) in read.lines.iter().enumerate() {
            let indices: Vec<PatternIndex> = patternset.matching_indices(&line.text);
            if indices.is_empty() {
                continue;
            }
            matched_bytes += matched_line_wire_sz(&line.text);
            if matched_bytes > self.config.max_matched_bytes && !matched_lines.is_empty() {
                // this line and those after it are left for the next pass
                defo!("matched-bytes cap {} reached at {}", self.config.max_matched_bytes, line.fileoffset);
                return (matched_lines, line.fileoffset, true);
            }
            defo!("{:?} matched at {}: {:?}", indices, line.fileoffset, str_to_String_noraw(&line.text));
            matched_lines.push(MatchedLine {
                indices,
                text: line.text.clone(),
                offset: line.fileoffset,
            });
            if let Some(max) = self.config.max_matched_lines {
                if matched_lines.len() as Count >= max {
                    // lines after this one are left for the next pass
                    let more_lines = at + 1 < read.lines.len();
                    defo!("matched-line cap {} reached at {}", max, line.fileoffset);
                    return (matched_lines, line.fileoffset_next(), more_lines || read.hit_budget);
                }
            }
        }

        (matched_lines, read.new_offset, read.hit_budget)
    }

    fn save(
        &self,
        state: &ReadState,
        offset: FileOffset,
        session: &FileSession,
    ) -> Result<(), TailError> {
        let state_new = ReadState {
            offset,
            fingerprint: Some(session.fingerprint()),
            skip_to_end: false,
            ..state.clone()
        };
        self.store
            .save(&state_new)
            .map_err(TailError::State)
    }
}
