// src/readers/filesession.rs

//! Implements a [`FileSession`], one opened log file bound to the
//! [`ReadState`] of a subscription.
//!
//! Opening reconciles the stored offset with the live file: a changed file
//! identity is a rotation, a shrunk file is a truncation, and either restarts
//! reading at offset 0.
//!
//! Reading is bounded twice: by the file size seen at open (bytes appended
//! during the pass are left for the next pass) and by a byte budget.
//! Only complete lines are returned. Trailing bytes without a newline are
//! never consumed; the next pass re-reads them from their first byte.
//! A session opened inside a line, as after a skip-to-end reset that landed
//! on an unterminated fragment, drops the rest of that line.
//!
//! [`ReadState`]: crate::data::readstate::ReadState

use crate::common::{
    Count, FPath, File, FileOffset, FileSz, NLu8, CRu8, ResultS3,
};
use crate::data::fingerprint::{FileIdentity, Fingerprint};
use crate::data::readstate::ReadState;
#[cfg(any(debug_assertions, test))]
use crate::debug::printers::buffer_to_String_noraw;
use crate::readers::helpers::fpath_to_path;

use std::borrow::Cow;
use std::fmt;
use std::io::prelude::Read;
use std::io::{BufRead, BufReader, Error, ErrorKind, Result, Seek, SeekFrom, Take};

use ::encoding_rs::Encoding;
#[allow(unused_imports)]
use ::more_asserts::{debug_assert_ge, debug_assert_le};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Capacity of the underlying `BufReader`.
pub const READ_BUFFER_SZ: usize = 0x10000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LineRead, ReadLinesResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One complete line read from the file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineRead {
    /// File offset of the first byte.
    pub fileoffset: FileOffset,
    /// Length in bytes including the line terminator.
    pub len: u64,
    /// Decoded text without the line terminator.
    pub text: String,
}

impl LineRead {
    /// File offset one past the line terminator, the start of the next line.
    pub const fn fileoffset_next(&self) -> FileOffset {
        self.fileoffset + self.len
    }
}

/// Outcome of [`FileSession::read_lines`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadLinesResult {
    /// In file order.
    pub lines: Vec<LineRead>,
    pub bytes_consumed: u64,
    /// The byte budget stopped reading while more complete lines remained.
    pub hit_budget: bool,
    /// Start of the first line not returned.
    pub new_offset: FileOffset,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// offset reconciliation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a pass starts and why.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartOffset {
    /// Continue at the stored offset.
    Resume(FileOffset),
    /// No pass completed before; start at 0.
    Beginning,
    /// Identity changed since the last pass; start at 0.
    Rotated,
    /// Same file, now smaller than the stored offset or than the size seen
    /// by the last pass; start at 0.
    Truncated,
    /// A skip-to-end reset is pending; start at the end of the file.
    SkipToEnd(FileOffset),
}

impl StartOffset {
    /// Decide the start of a pass from the stored `state` and the live file.
    pub fn reconcile(
        state: &ReadState,
        identity: &FileIdentity,
        filesz: FileSz,
    ) -> StartOffset {
        if state.skip_to_end {
            return StartOffset::SkipToEnd(filesz);
        }
        match &state.fingerprint {
            None => StartOffset::Beginning,
            Some(fingerprint) if !fingerprint.same_file(identity) => StartOffset::Rotated,
            Some(fingerprint) if filesz < state.offset || filesz < fingerprint.size_at_last_read => {
                StartOffset::Truncated
            }
            Some(_) => StartOffset::Resume(state.offset),
        }
    }

    pub const fn fileoffset(&self) -> FileOffset {
        match self {
            StartOffset::Resume(fo) | StartOffset::SkipToEnd(fo) => *fo,
            StartOffset::Beginning | StartOffset::Rotated | StartOffset::Truncated => 0,
        }
    }

    pub const fn is_rotated(&self) -> bool {
        matches!(self, StartOffset::Rotated)
    }

    pub const fn is_truncated(&self) -> bool {
        matches!(self, StartOffset::Truncated)
    }

    pub const fn is_skip_to_end(&self) -> bool {
        matches!(self, StartOffset::SkipToEnd(_))
    }
}

impl fmt::Display for StartOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StartOffset::Resume(fo) => write!(f, "resume at {}", fo),
            StartOffset::Beginning => write!(f, "beginning"),
            StartOffset::Rotated => write!(f, "rotated, restart at 0"),
            StartOffset::Truncated => write!(f, "truncated, restart at 0"),
            StartOffset::SkipToEnd(fo) => write!(f, "skip to end at {}", fo),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FileSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A log file opened read-only at the reconciled offset of a subscription.
///
/// The file is never locked; the process writing the log keeps writing.
pub struct FileSession {
    path: FPath,
    /// Bounded to the file size seen at open.
    reader: BufReader<Take<File>>,
    identity: FileIdentity,
    /// File size seen at open.
    filesz: FileSz,
    start: StartOffset,
    /// Start of the next unread line.
    fileoffset: FileOffset,
    /// Only an unterminated fragment remains before `filesz`.
    fragment_at_end: bool,
    /// Opened inside a line; its rest is not returned.
    mid_line: bool,
    /// Reused between lines.
    buffer: Vec<u8>,
    encoding: &'static Encoding,
    /// Complete lines returned so far.
    count_lines: Count,
}

impl fmt::Debug for FileSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileSession")
            .field("path", &self.path)
            .field("identity", &self.identity)
            .field("filesz", &self.filesz)
            .field("start", &self.start)
            .field("fileoffset", &self.fileoffset)
            .field("fragment_at_end", &self.fragment_at_end)
            .field("mid_line", &self.mid_line)
            .field("encoding", &self.encoding.name())
            .field("count_lines", &self.count_lines)
            .finish()
    }
}

impl FileSession {
    /// Open `path` and position it per `state`.
    ///
    /// A missing file is an `Err` of kind `ErrorKind::NotFound`. An encoding
    /// failing [`encoding_supported`] is an `Err` of kind
    /// `ErrorKind::InvalidInput`.
    pub fn open(
        path: &FPath,
        state: &ReadState,
        encoding: &'static Encoding,
    ) -> Result<FileSession> {
        defn!("({:?}, {})", path, state);
        if !encoding_supported(encoding) {
            defx!("unsupported encoding {}", encoding.name());
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("encoding {} does not end lines with the byte '\\n'", encoding.name()),
            ));
        }
        let mut file: File = match File::open(fpath_to_path(path)) {
            Ok(val) => val,
            Err(err) => {
                defx!("File::open({:?}) error {}", path, err);
                return Err(err);
            }
        };
        let metadata = file.metadata()?;
        if metadata.is_dir() {
            defx!("{:?} is a directory", path);
            return Err(Error::new(ErrorKind::InvalidInput, format!("{:?} is a directory", path)));
        }
        let identity = FileIdentity::from_metadata(&metadata);
        let filesz: FileSz = metadata.len();
        let start = StartOffset::reconcile(state, &identity, filesz);
        defo!("identity {}, filesz {}, start {}", identity, filesz, start);
        let fileoffset: FileOffset = start.fileoffset();
        debug_assert_le!(fileoffset, filesz, "start beyond end of file");
        let mid_line: bool = starts_mid_line(&mut file, fileoffset)?;
        file.seek(SeekFrom::Start(fileoffset))?;
        let reader = BufReader::with_capacity(READ_BUFFER_SZ, file.take(filesz - fileoffset));
        defx!("fileoffset {}, mid_line {}", fileoffset, mid_line);

        Ok(FileSession {
            path: path.clone(),
            reader,
            identity,
            filesz,
            start,
            fileoffset,
            fragment_at_end: false,
            mid_line,
            buffer: Vec::with_capacity(0x400),
            encoding,
            count_lines: 0,
        })
    }

    pub const fn path(&self) -> &FPath {
        &self.path
    }

    pub const fn identity(&self) -> FileIdentity {
        self.identity
    }

    /// File size seen at open.
    pub const fn filesz(&self) -> FileSz {
        self.filesz
    }

    pub const fn start(&self) -> StartOffset {
        self.start
    }

    /// Offset the session was positioned at when opened.
    pub const fn effective_offset(&self) -> FileOffset {
        self.start.fileoffset()
    }

    pub const fn rotated(&self) -> bool {
        self.start.is_rotated()
    }

    pub const fn truncated(&self) -> bool {
        self.start.is_truncated()
    }

    /// Start of the next unread line.
    pub const fn fileoffset(&self) -> FileOffset {
        self.fileoffset
    }

    pub const fn count_lines(&self) -> Count {
        self.count_lines
    }

    /// Fingerprint to persist for a pass that ended at `filesz`.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.identity, self.filesz)
    }

    /// Consume the rest of the line the session was opened inside of.
    /// If that rest is still unterminated, nothing is consumed.
    fn skip_line_rest(&mut self) -> Result<()> {
        self.buffer.clear();
        let nread: usize = self.reader.read_until(NLu8, &mut self.buffer)?;
        if self.buffer.last() == Some(&NLu8) {
            defñ!("skipped {} bytes at {}", nread, self.fileoffset);
            self.fileoffset += nread as FileOffset;
            self.mid_line = false;
        } else {
            defñ!("rest of line at {} still unterminated", self.fileoffset);
            self.fragment_at_end = true;
        }

        Ok(())
    }

    /// Read the next complete line.
    ///
    /// `Done` at the end of the file, or when only an unterminated fragment
    /// remains; the fragment is not consumed.
    pub fn next_line(&mut self) -> ResultS3<LineRead, Error> {
        if self.mid_line && !self.fragment_at_end {
            if let Err(err) = self.skip_line_rest() {
                return ResultS3::Err(err);
            }
        }
        if self.fragment_at_end {
            return ResultS3::Done;
        }
        self.buffer.clear();
        let nread: usize = match self.reader.read_until(NLu8, &mut self.buffer) {
            Ok(val) => val,
            Err(err) => {
                defñ!("read_until error {}", err);
                return ResultS3::Err(err);
            }
        };
        if nread == 0 {
            defñ!("EOF at {}", self.fileoffset);
            return ResultS3::Done;
        }
        if self.buffer.last() != Some(&NLu8) {
            defñ!(
                "fragment of {} bytes at {}: {:?}",
                nread,
                self.fileoffset,
                buffer_to_String_noraw(&self.buffer)
            );
            self.fragment_at_end = true;
            return ResultS3::Done;
        }
        let mut end: usize = self.buffer.len() - 1;
        if end > 0 && self.buffer[end - 1] == CRu8 {
            end -= 1;
        }
        let fileoffset = self.fileoffset;
        let text = decode_line(self.encoding, &self.buffer[..end], fileoffset == 0).into_owned();
        self.fileoffset += nread as FileOffset;
        self.count_lines += 1;
        defñ!("line at {} len {}: {:?}", fileoffset, nread, buffer_to_String_noraw(&self.buffer));

        ResultS3::Found(LineRead {
            fileoffset,
            len: nread as u64,
            text,
        })
    }

    /// Is another complete line waiting before `filesz`?
    ///
    /// Only inspects what one buffer fill returns; if that holds no newline
    /// but more bytes remain, the answer is `true`.
    fn complete_line_pending(&mut self) -> Result<bool> {
        if self.fragment_at_end || self.fileoffset >= self.filesz {
            return Ok(false);
        }
        let remaining: u64 = self.filesz - self.fileoffset;
        let buffered: &[u8] = self.reader.fill_buf()?;
        if buffered.is_empty() {
            // file shrank during the pass
            return Ok(false);
        }
        if buffered.contains(&NLu8) {
            return Ok(true);
        }

        Ok((buffered.len() as u64) < remaining)
    }

    /// Read complete lines until `byte_budget` bytes are consumed or no
    /// complete line remains.
    ///
    /// The budget is checked between lines, so the last line may carry the
    /// total past the budget, and a line longer than the budget is still
    /// returned whole.
    pub fn read_lines(
        &mut self,
        byte_budget: u64,
    ) -> Result<ReadLinesResult> {
        defn!("({}) at {}", byte_budget, self.fileoffset);
        let offset_beg: FileOffset = self.fileoffset;
        let mut lines: Vec<LineRead> = Vec::new();
        let mut hit_budget: bool = false;
        loop {
            if self.fileoffset - offset_beg >= byte_budget {
                hit_budget = self.complete_line_pending()?;
                defo!("budget {} reached, hit_budget {}", byte_budget, hit_budget);
                break;
            }
            match self.next_line() {
                ResultS3::Found(line) => lines.push(line),
                ResultS3::Done => break,
                ResultS3::Err(err) => {
                    defx!("error {}", err);
                    return Err(err);
                }
            }
        }
        let bytes_consumed: u64 = self.fileoffset - offset_beg;
        debug_assert_ge!(self.filesz, self.fileoffset, "read past the snapshot size");
        defx!(
            "{} lines, bytes_consumed {}, hit_budget {}, new_offset {}",
            lines.len(),
            bytes_consumed,
            hit_budget,
            self.fileoffset
        );

        Ok(ReadLinesResult {
            lines,
            bytes_consumed,
            hit_budget,
            new_offset: self.fileoffset,
        })
    }
}

/// Does `fileoffset` fall inside a line, after a byte other than `'\n'`?
fn starts_mid_line(
    file: &mut File,
    fileoffset: FileOffset,
) -> Result<bool> {
    if fileoffset == 0 {
        return Ok(false);
    }
    let mut byte: [u8; 1] = [0; 1];
    file.seek(SeekFrom::Start(fileoffset - 1))?;
    file.read_exact(&mut byte)?;

    Ok(byte[0] != NLu8)
}

/// Reject an encoding whose line terminator is not the single byte `'\n'`,
/// like UTF-16.
pub fn encoding_supported(encoding: &'static Encoding) -> bool {
    encoding.is_ascii_compatible()
}

/// Decode one line of raw bytes. Malformed sequences become `U+FFFD`.
///
/// A byte order mark is removed from the line at file offset 0.
pub fn decode_line<'a>(
    encoding: &'static Encoding,
    bytes: &'a [u8],
    at_file_start: bool,
) -> Cow<'a, str> {
    let (text, had_errors) = match at_file_start {
        true => encoding.decode_with_bom_removal(bytes),
        false => encoding.decode_without_bom_handling(bytes),
    };
    if had_errors {
        defñ!("malformed bytes replaced");
    }

    text
}
