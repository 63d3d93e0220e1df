// src/marshal/messages.rs

//! The closed set of messages exchanged with `ltm`, and their field order
//! on the wire.
//!
//! | message              | direction      | fields, in order |
//! |----------------------|----------------|------------------|
//! | [`ReadRequest`]        | caller → `ltm` | `Text` file path, `Text` subscription id, `PatternSeq` patterns |
//! | [`MarshalTestRequest`] | caller → `ltm` | as `ReadRequest`, then `Int` matched-lines count hint |
//! | [`ResetRequest`]       | caller → `ltm` | `Text` file path, `Text` subscription id, `Int` reset-on-read |
//! | [`ReadResponse`]       | `ltm` → caller | `Text` file path, `Text` subscription id, `PatternSeq` patterns, `Int` matched line count, `Int` was-partial-read, `TextSeq` matched lines |

use crate::common::{FPath, SubscriptionId};
use crate::data::matchresult::MatchResult;
use crate::data::pattern::{PatternSpec, PatternSpecs};
use crate::marshal::codec::{Marshal, MarshalError, UnMarshal};

use std::io::{Read, Write};

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// `was_partial_read` of a marshal self test response.
pub const MARSHAL_TEST_PARTIAL: i32 = 65536;

/// A message with a fixed field order.
pub trait WireMessage: Sized {
    /// Append this message's fields to `marshal`.
    fn marshal(
        &self,
        marshal: &mut Marshal,
    ) -> Result<(), MarshalError>;

    /// Take this message's fields from `unmarshal`.
    fn unmarshal(unmarshal: &mut UnMarshal) -> Result<Self, MarshalError>;

    /// Write this message as one frame.
    fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> Result<(), MarshalError> {
        let mut marshal = Marshal::new();
        self.marshal(&mut marshal)?;
        marshal.flush(writer)
    }

    /// Read one frame holding exactly this message.
    fn read_from<R: Read>(reader: &mut R) -> Result<Self, MarshalError> {
        let mut unmarshal = UnMarshal::read_frame(reader)?;
        let message = Self::unmarshal(&mut unmarshal)?;
        unmarshal.finish()?;

        Ok(message)
    }
}

/// Saturating `usize` to wire `i32`.
fn count_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReadRequest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ask `ltm -p` for one tail pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadRequest {
    pub file_path: FPath,
    pub subscription_id: SubscriptionId,
    pub patterns: PatternSpecs,
}

impl ReadRequest {
    pub fn new(
        file_path: &str,
        subscription_id: &str,
        patterns: PatternSpecs,
    ) -> ReadRequest {
        ReadRequest {
            file_path: FPath::from(file_path),
            subscription_id: SubscriptionId::from(subscription_id),
            patterns,
        }
    }
}

impl WireMessage for ReadRequest {
    fn marshal(
        &self,
        marshal: &mut Marshal,
    ) -> Result<(), MarshalError> {
        marshal.put_text(&self.file_path)?;
        marshal.put_text(&self.subscription_id)?;
        marshal.put_pattern_seq(&self.patterns)
    }

    fn unmarshal(unmarshal: &mut UnMarshal) -> Result<ReadRequest, MarshalError> {
        Ok(ReadRequest {
            file_path: unmarshal.get_text()?,
            subscription_id: unmarshal.get_text()?,
            patterns: unmarshal.get_pattern_seq()?,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MarshalTestRequest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ask `ltm -m` for a synthesized response; nothing is read from disk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MarshalTestRequest {
    pub request: ReadRequest,
    /// Count of synthesized matched lines in the response.
    pub matched_lines_count_hint: i32,
}

impl WireMessage for MarshalTestRequest {
    fn marshal(
        &self,
        marshal: &mut Marshal,
    ) -> Result<(), MarshalError> {
        self.request.marshal(marshal)?;
        marshal.put_int(self.matched_lines_count_hint);
        Ok(())
    }

    fn unmarshal(unmarshal: &mut UnMarshal) -> Result<MarshalTestRequest, MarshalError> {
        let request = ReadRequest::unmarshal(unmarshal)?;
        let matched_lines_count_hint = unmarshal.get_int()?;

        Ok(MarshalTestRequest {
            request,
            matched_lines_count_hint,
        })
    }
}

/// Text of synthesized line `at` of a marshal self test.
pub fn marshal_test_line(at: i32) -> String {
    format!("This is entry number {} in the vector", at)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResetRequest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ask `ltm -r` to reset one subscription.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResetRequest {
    pub file_path: FPath,
    pub subscription_id: SubscriptionId,
    /// Non-zero: the next pass skips to the end of the file.
    /// Zero: the next pass starts at offset 0.
    pub reset_on_read: i32,
}

impl ResetRequest {
    pub fn new(
        file_path: &str,
        subscription_id: &str,
        reset_on_read: bool,
    ) -> ResetRequest {
        ResetRequest {
            file_path: FPath::from(file_path),
            subscription_id: SubscriptionId::from(subscription_id),
            reset_on_read: reset_on_read as i32,
        }
    }

    pub const fn is_reset_on_read(&self) -> bool {
        self.reset_on_read != 0
    }
}

impl WireMessage for ResetRequest {
    fn marshal(
        &self,
        marshal: &mut Marshal,
    ) -> Result<(), MarshalError> {
        marshal.put_text(&self.file_path)?;
        marshal.put_text(&self.subscription_id)?;
        marshal.put_int(self.reset_on_read);
        Ok(())
    }

    fn unmarshal(unmarshal: &mut UnMarshal) -> Result<ResetRequest, MarshalError> {
        Ok(ResetRequest {
            file_path: unmarshal.get_text()?,
            subscription_id: unmarshal.get_text()?,
            reset_on_read: unmarshal.get_int()?,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReadResponse
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answer to a [`ReadRequest`] or [`MarshalTestRequest`].
///
/// The path, subscription id and patterns echo the request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadResponse {
    pub file_path: FPath,
    pub subscription_id: SubscriptionId,
    pub patterns: PatternSpecs,
    /// Always `matched_lines.len()`.
    pub matched_line_count: i32,
    /// Zero if the file was drained, else the byte budget of the pass.
    pub was_partial_read: i32,
    pub matched_lines: Vec<String>,
}

impl ReadResponse {
    /// A zero-match response echoing `request`.
    pub fn new_empty(request: &ReadRequest) -> ReadResponse {
        ReadResponse {
            file_path: request.file_path.clone(),
            subscription_id: request.subscription_id.clone(),
            patterns: request.patterns.clone(),
            ..Default::default()
        }
    }

    /// The response to a completed pass run with `byte_budget`.
    pub fn from_match_result(
        result: &MatchResult,
        byte_budget: u64,
    ) -> ReadResponse {
        let matched_lines: Vec<String> = result.matched_texts();
        let was_partial_read: i32 = match result.was_partial_read {
            true => i32::try_from(byte_budget).unwrap_or(i32::MAX).max(1),
            false => 0,
        };
        ReadResponse {
            file_path: result.file_path.clone(),
            subscription_id: result.subscription_id.clone(),
            patterns: result.patterns.clone(),
            matched_line_count: count_i32(matched_lines.len()),
            was_partial_read,
            matched_lines,
        }
    }

    /// The response of a marshal self test: every request field echoed and
    /// `matched_lines_count_hint` synthesized lines.
    pub fn new_marshal_test(test: &MarshalTestRequest) -> ReadResponse {
        let matched_lines: Vec<String> = (0..test.matched_lines_count_hint.max(0))
            .map(marshal_test_line)
            .collect();
        ReadResponse {
            matched_line_count: count_i32(matched_lines.len()),
            was_partial_read: MARSHAL_TEST_PARTIAL,
            matched_lines,
            ..ReadResponse::new_empty(&test.request)
        }
    }

    /// Should the caller call again?
    pub const fn is_partial_read(&self) -> bool {
        self.was_partial_read != 0
    }

    /// Does this response echo `request`?
    pub fn echoes(
        &self,
        request: &ReadRequest,
    ) -> bool {
        self.file_path == request.file_path
            && self.subscription_id == request.subscription_id
            && self.patterns == request.patterns
    }
}

impl WireMessage for ReadResponse {
    fn marshal(
        &self,
        marshal: &mut Marshal,
    ) -> Result<(), MarshalError> {
        marshal.put_text(&self.file_path)?;
        marshal.put_text(&self.subscription_id)?;
        marshal.put_pattern_seq(&self.patterns)?;
        marshal.put_int(self.matched_line_count);
        marshal.put_int(self.was_partial_read);
        marshal.put_text_seq(&self.matched_lines)
    }

    /// Errors if the matched line count disagrees with the lines carried.
    fn unmarshal(unmarshal: &mut UnMarshal) -> Result<ReadResponse, MarshalError> {
        let file_path = unmarshal.get_text()?;
        let subscription_id = unmarshal.get_text()?;
        let patterns: Vec<PatternSpec> = unmarshal.get_pattern_seq()?;
        let matched_line_count = unmarshal.get_int()?;
        let was_partial_read = unmarshal.get_int()?;
        let matched_lines = unmarshal.get_text_seq()?;
        if matched_line_count != count_i32(matched_lines.len()) {
            defñ!("count {} != {}", matched_line_count, matched_lines.len());
            return Err(MarshalError::Framing(format!(
                "matched line count {} but {} matched lines",
                matched_line_count,
                matched_lines.len()
            )));
        }

        Ok(ReadResponse {
            file_path,
            subscription_id,
            patterns,
            matched_line_count,
            was_partial_read,
            matched_lines,
        })
    }
}
