// src/marshal/codec.rs

//! Implements the framed, tagged binary codec spoken between `ltm` and its
//! caller: [`Marshal`] (write side) and [`UnMarshal`] (read side).
//!
//! ## Frame
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ payload len: u32 │ payload: sequence of values  │
//! │ big-endian       │                              │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Values
//!
//! Every value starts with a one-byte [`Tag`]. All integers are big-endian.
//!
//! | tag  | value         | body                                              |
//! |------|---------------|---------------------------------------------------|
//! | 0x01 | `Int`         | `i32`                                             |
//! | 0x02 | `UInt`        | `u64`                                             |
//! | 0x03 | `Text`        | `u32` byte len, UTF-8 bytes                       |
//! | 0x04 | `TextSeq`     | `u32` count, then per text `u32` len, UTF-8 bytes |
//! | 0x05 | `PatternSeq`  | `u32` count, then per pattern `i32` index, `u32` len, UTF-8 bytes |
//!
//! The write side accumulates values and writes the whole frame at once in
//! [`Marshal::flush`]. The read side blocks until the declared payload
//! length has arrived.

use crate::common::PatternIndex;
use crate::data::pattern::PatternSpec;

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::string::FromUtf8Error;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Largest payload accepted by [`UnMarshal::read_frame`], 64 MiB.
pub const FRAME_PAYLOAD_MAX: u32 = 0x400_0000;

/// Bytes of the frame header.
pub const FRAME_HEADER_SZ: usize = 4;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MarshalError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Malformed, truncated, or undeliverable wire data.
#[derive(Debug, ::thiserror::Error)]
pub enum MarshalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("unexpected tag {found:#04x}, expected {expected}")]
    UnexpectedTag {
        expected: Tag,
        found: u8,
    },
    #[error("truncated data, needed {needed} bytes but {available} available")]
    Truncated {
        needed: usize,
        available: usize,
    },
    #[error("frame payload of {0} bytes exceeds the 64 MiB limit")]
    FrameTooLarge(u32),
    #[error("invalid UTF-8 text: {0}")]
    InvalidText(#[from] FromUtf8Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tag
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Type tag leading every value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Tag {
    Int = 0x01,
    UInt = 0x02,
    Text = 0x03,
    TextSeq = 0x04,
    PatternSeq = 0x05,
}

impl Tag {
    pub const fn from_u8(byte: u8) -> Option<Tag> {
        match byte {
            0x01 => Some(Tag::Int),
            0x02 => Some(Tag::UInt),
            0x03 => Some(Tag::Text),
            0x04 => Some(Tag::TextSeq),
            0x05 => Some(Tag::PatternSeq),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({:#04x})", self, *self as u8)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Marshal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write side; values accumulate in memory until [`flush`](Marshal::flush).
#[derive(Debug, Default)]
pub struct Marshal {
    payload: Vec<u8>,
}

/// `usize` length as the wire's `u32`.
fn len_u32(len: usize) -> Result<u32, MarshalError> {
    match u32::try_from(len) {
        Ok(val) => Ok(val),
        Err(_) => Err(MarshalError::Framing(format!("length {} does not fit in u32", len))),
    }
}

impl Marshal {
    pub fn new() -> Marshal {
        Marshal::default()
    }

    /// Bytes of payload accumulated so far.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    fn put_len(
        &mut self,
        len: usize,
    ) -> Result<(), MarshalError> {
        let len = len_u32(len)?;
        self.payload.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }

    fn put_str_body(
        &mut self,
        text: &str,
    ) -> Result<(), MarshalError> {
        self.put_len(text.len())?;
        self.payload.extend_from_slice(text.as_bytes());
        Ok(())
    }

    pub fn put_int(
        &mut self,
        value: i32,
    ) {
        self.payload.push(Tag::Int as u8);
        self.payload.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_uint(
        &mut self,
        value: u64,
    ) {
        self.payload.push(Tag::UInt as u8);
        self.payload.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_text(
        &mut self,
        text: &str,
    ) -> Result<(), MarshalError> {
        self.payload.push(Tag::Text as u8);
        self.put_str_body(text)
    }

    pub fn put_text_seq<S: AsRef<str>>(
        &mut self,
        texts: &[S],
    ) -> Result<(), MarshalError> {
        self.payload.push(Tag::TextSeq as u8);
        self.put_len(texts.len())?;
        for text in texts.iter() {
            self.put_str_body(text.as_ref())?;
        }
        Ok(())
    }

    pub fn put_pattern_seq(
        &mut self,
        patterns: &[PatternSpec],
    ) -> Result<(), MarshalError> {
        self.payload.push(Tag::PatternSeq as u8);
        self.put_len(patterns.len())?;
        for pattern in patterns.iter() {
            self.payload.extend_from_slice(&pattern.index.to_be_bytes());
            self.put_str_body(&pattern.expression)?;
        }
        Ok(())
    }

    /// Write the accumulated values as one frame and flush `writer`.
    /// The accumulated values are cleared.
    pub fn flush<W: Write>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), MarshalError> {
        defn!("payload {} bytes", self.payload.len());
        let len = len_u32(self.payload.len())?;
        if len > FRAME_PAYLOAD_MAX {
            defx!("too large");
            return Err(MarshalError::FrameTooLarge(len));
        }
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        self.payload.clear();
        defx!();

        Ok(())
    }

    /// The whole frame, header included.
    pub fn into_frame(self) -> Vec<u8> {
        let mut frame: Vec<u8> = Vec::with_capacity(FRAME_HEADER_SZ + self.payload.len());
        frame.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&self.payload);

        frame
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UnMarshal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read side; values are taken in order from one received frame.
#[derive(Debug)]
pub struct UnMarshal {
    payload: Vec<u8>,
    at: usize,
}

/// Read until `buffer` is full or EOF. Returns the count of bytes read.
/// Blocks while the peer has not sent enough.
fn read_full<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
) -> Result<usize, MarshalError> {
    let mut filled: usize = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(MarshalError::Io(err)),
        }
    }

    Ok(filled)
}

impl UnMarshal {
    /// Block until one whole frame arrives from `reader`.
    pub fn read_frame<R: Read>(reader: &mut R) -> Result<UnMarshal, MarshalError> {
        defn!();
        let mut header = [0u8; FRAME_HEADER_SZ];
        let got = read_full(reader, &mut header)?;
        if got != FRAME_HEADER_SZ {
            defx!("header truncated at {}", got);
            return Err(MarshalError::Truncated {
                needed: FRAME_HEADER_SZ,
                available: got,
            });
        }
        let len: u32 = u32::from_be_bytes(header);
        if len > FRAME_PAYLOAD_MAX {
            defx!("payload len {} too large", len);
            return Err(MarshalError::FrameTooLarge(len));
        }
        let mut payload: Vec<u8> = vec![0; len as usize];
        let got = read_full(reader, &mut payload)?;
        if got != payload.len() {
            defx!("payload truncated at {} of {}", got, len);
            return Err(MarshalError::Truncated {
                needed: payload.len(),
                available: got,
            });
        }
        defx!("payload {} bytes", len);

        Ok(UnMarshal::from_payload(payload))
    }

    /// Wrap a frame payload (no header).
    pub fn from_payload(payload: Vec<u8>) -> UnMarshal {
        UnMarshal { payload, at: 0 }
    }

    /// Bytes not yet taken.
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.at
    }

    /// Error if any bytes were left untaken.
    pub fn finish(&self) -> Result<(), MarshalError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(MarshalError::Framing(format!("{} trailing bytes after last value", n))),
        }
    }

    fn take(
        &mut self,
        len: usize,
    ) -> Result<&[u8], MarshalError> {
        if self.remaining() < len {
            return Err(MarshalError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let beg = self.at;
        self.at += len;

        Ok(&self.payload[beg..self.at])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], MarshalError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);

        Ok(array)
    }

    fn expect_tag(
        &mut self,
        expected: Tag,
    ) -> Result<(), MarshalError> {
        let [found] = self.take_array::<1>()?;
        if found != expected as u8 {
            return Err(MarshalError::UnexpectedTag { expected, found });
        }
        Ok(())
    }

    fn take_len(&mut self) -> Result<usize, MarshalError> {
        Ok(u32::from_be_bytes(self.take_array::<4>()?) as usize)
    }

    fn take_str_body(&mut self) -> Result<String, MarshalError> {
        let len = self.take_len()?;
        let bytes = self.take(len)?.to_vec();

        Ok(String::from_utf8(bytes)?)
    }

    /// Count of a sequence, checked against the bytes left so a corrupt
    /// count cannot trigger a huge allocation. Every element takes at least
    /// `element_min` bytes.
    fn take_count(
        &mut self,
        element_min: usize,
    ) -> Result<usize, MarshalError> {
        let count = self.take_len()?;
        let needed = count.saturating_mul(element_min);
        if needed > self.remaining() {
            return Err(MarshalError::Truncated {
                needed,
                available: self.remaining(),
            });
        }

        Ok(count)
    }

    pub fn get_int(&mut self) -> Result<i32, MarshalError> {
        self.expect_tag(Tag::Int)?;
        Ok(i32::from_be_bytes(self.take_array::<4>()?))
    }

    pub fn get_uint(&mut self) -> Result<u64, MarshalError> {
        self.expect_tag(Tag::UInt)?;
        Ok(u64::from_be_bytes(self.take_array::<8>()?))
    }

    pub fn get_text(&mut self) -> Result<String, MarshalError> {
        self.expect_tag(Tag::Text)?;
        self.take_str_body()
    }

    pub fn get_text_seq(&mut self) -> Result<Vec<String>, MarshalError> {
        self.expect_tag(Tag::TextSeq)?;
        let count = self.take_count(4)?;
        let mut texts: Vec<String> = Vec::with_capacity(count);
        for _ in 0..count {
            texts.push(self.take_str_body()?);
        }

        Ok(texts)
    }

    pub fn get_pattern_seq(&mut self) -> Result<Vec<PatternSpec>, MarshalError> {
        self.expect_tag(Tag::PatternSeq)?;
        let count = self.take_count(8)?;
        let mut patterns: Vec<PatternSpec> = Vec::with_capacity(count);
        for _ in 0..count {
            let index: PatternIndex = i32::from_be_bytes(self.take_array::<4>()?);
            let expression = self.take_str_body()?;
            patterns.push(PatternSpec { index, expression });
        }

        Ok(patterns)
    }
}
