// src/tests/filesession_tests.rs

//! tests for `readers/filesession.rs`

#![allow(non_snake_case)]

use crate::common::{FPath, FileOffset, ResultS3};
use crate::data::fingerprint::{FileIdentity, Fingerprint};
use crate::data::readstate::{ReadState, Subscription};
use crate::debug::helpers::{
    append_file_bytes, create_temp_dir, create_temp_file, create_temp_file_bytes, fpath_in_tmpdir,
    ntf_fpath,
};
use crate::readers::filesession::{
    decode_line, encoding_supported, FileSession, LineRead, StartOffset,
};
use crate::readers::helpers::path_to_fpath;

use std::io::ErrorKind;

use ::encoding_rs::{UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use ::more_asserts::assert_le;
use ::test_case::test_case;

const ID_A: FileIdentity = FileIdentity {
    device_id: 1,
    inode_id: 10,
};
const ID_B: FileIdentity = FileIdentity {
    device_id: 1,
    inode_id: 11,
};

fn default_state(path: &FPath) -> ReadState {
    ReadState::new_default(&Subscription::new("q", path))
}

fn state_with(path: &FPath, offset: FileOffset, identity: FileIdentity) -> ReadState {
    ReadState {
        offset,
        fingerprint: Some(Fingerprint::new(identity, offset)),
        ..default_state(path)
    }
}

/// helper to wrap the match and panic checks
fn new_FileSession(path: &FPath, state: &ReadState) -> FileSession {
    match FileSession::open(path, state, UTF_8) {
        Ok(val) => val,
        Err(err) => panic!("FileSession::open({:?}) failed {}", path, err),
    }
}

/// Texts of all complete lines.
fn read_all_texts(session: &mut FileSession) -> Vec<String> {
    let mut texts: Vec<String> = Vec::new();
    loop {
        match session.next_line() {
            ResultS3::Found(line) => texts.push(line.text),
            ResultS3::Done => break,
            ResultS3::Err(err) => panic!("next_line error {}", err),
        }
    }
    texts
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StartOffset::reconcile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_reconcile_beginning() {
    let state = default_state(&FPath::from("/f"));
    assert_eq!(StartOffset::reconcile(&state, &ID_A, 100), StartOffset::Beginning);
}

#[test_case(0, 100, StartOffset::Resume(0); "resume at zero")]
#[test_case(50, 100, StartOffset::Resume(50); "resume in middle")]
#[test_case(100, 100, StartOffset::Resume(100); "resume at end")]
#[test_case(101, 100, StartOffset::Truncated; "truncated")]
#[test_case(500, 0, StartOffset::Truncated; "truncated to empty")]
fn test_reconcile_same_file(offset: FileOffset, filesz: u64, expected: StartOffset) {
    let state = state_with(&FPath::from("/f"), offset, ID_A);
    assert_eq!(StartOffset::reconcile(&state, &ID_A, filesz), expected);
}

/// Same file shrunk below the size seen by the last pass, though not below
/// the stored offset, was rewritten; start over.
#[test_case(40, 100, 99, StartOffset::Truncated; "shrunk below last size")]
#[test_case(40, 100, 40, StartOffset::Truncated; "shrunk to offset")]
#[test_case(40, 100, 100, StartOffset::Resume(40); "unchanged size")]
#[test_case(40, 100, 150, StartOffset::Resume(40); "grown")]
fn test_reconcile_size_at_last_read(
    offset: FileOffset,
    size_at_last_read: u64,
    filesz: u64,
    expected: StartOffset,
) {
    let state = ReadState {
        offset,
        fingerprint: Some(Fingerprint::new(ID_A, size_at_last_read)),
        ..default_state(&FPath::from("/f"))
    };
    assert_eq!(StartOffset::reconcile(&state, &ID_A, filesz), expected);
}

#[test]
fn test_reconcile_rotated() {
    let state = state_with(&FPath::from("/f"), 50, ID_A);
    let start = StartOffset::reconcile(&state, &ID_B, 1000);
    assert_eq!(start, StartOffset::Rotated);
    assert!(start.is_rotated());
    assert_eq!(start.fileoffset(), 0);
}

#[test]
fn test_reconcile_skip_to_end() {
    let state = ReadState::new_skip_to_end(&Subscription::new("q", "/f"));
    let start = StartOffset::reconcile(&state, &ID_A, 321);
    assert_eq!(start, StartOffset::SkipToEnd(321));
    assert!(start.is_skip_to_end());
    assert_eq!(start.fileoffset(), 321);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FileSession::open
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_open_not_found() {
    let tmpdir = create_temp_dir();
    let path = fpath_in_tmpdir(&tmpdir, "missing.log");
    let err = FileSession::open(&path, &default_state(&path), UTF_8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_open_directory() {
    let tmpdir = create_temp_dir();
    let path = path_to_fpath(tmpdir.path());
    let err = FileSession::open(&path, &default_state(&path), UTF_8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_open_resume() {
    let ntf = create_temp_file("one\ntwo\nthree\n");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let mut session = new_FileSession(&path, &state_with(&path, 4, identity));
    assert_eq!(session.start(), StartOffset::Resume(4));
    assert_eq!(session.effective_offset(), 4);
    assert_eq!(session.filesz(), 14);
    assert!(!session.rotated());
    assert!(!session.truncated());
    assert_eq!(read_all_texts(&mut session), vec!["two", "three"]);
    assert_eq!(session.fileoffset(), 14);
    assert_eq!(session.count_lines(), 2);
    assert_eq!(session.fingerprint(), Fingerprint::new(identity, 14));
}

#[cfg(unix)]
#[test]
fn test_open_rotated_restarts_at_zero() {
    let ntf = create_temp_file("new file\n");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let other = FileIdentity {
        device_id: identity.device_id,
        inode_id: identity.inode_id.wrapping_add(1),
    };
    let mut session = new_FileSession(&path, &state_with(&path, 5, other));
    assert!(session.rotated());
    assert_eq!(session.effective_offset(), 0);
    assert_eq!(read_all_texts(&mut session), vec!["new file"]);
}

#[test_case("one\ntwo\n", 8; "ends with newline")]
#[test_case("one\nhalf-wr", 11; "ends with fragment")]
#[test_case("only-fragment", 13; "no newline at all")]
#[test_case("", 0; "empty file")]
fn test_open_skip_to_end(data: &str, expected: FileOffset) {
    let ntf = create_temp_file(data);
    let path = ntf_fpath(&ntf);
    let state = ReadState::new_skip_to_end(&Subscription::new("q", &path));
    let mut session = new_FileSession(&path, &state);
    assert_eq!(session.start(), StartOffset::SkipToEnd(expected));
    assert_eq!(session.effective_offset(), expected);
    assert!(read_all_texts(&mut session).is_empty());
    assert_eq!(session.fileoffset(), expected);
}

#[test]
fn test_open_mid_line_drops_rest_of_line() {
    let ntf = create_temp_file("one\ntwo\nthree\n");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let mut session = new_FileSession(&path, &state_with(&path, 5, identity));
    assert_eq!(session.start(), StartOffset::Resume(5));
    assert_eq!(read_all_texts(&mut session), vec!["three"]);
    assert_eq!(session.fileoffset(), 14);
}

#[test]
fn test_open_mid_line_rest_unterminated() {
    let ntf = create_temp_file("one\nhalf");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let mut session = new_FileSession(&path, &state_with(&path, 6, identity));
    assert!(read_all_texts(&mut session).is_empty());
    assert_eq!(session.fileoffset(), 6, "nothing consumed");

    append_file_bytes(&path, b"-done\nnext\n");
    let mut session = new_FileSession(&path, &state_with(&path, 6, identity));
    let result = session.read_lines(1000).unwrap();
    assert_eq!(result.lines.len(), 1);
    assert_eq!(result.lines[0].text, "next");
    assert_eq!(result.lines[0].fileoffset, 14);
    assert_eq!(result.bytes_consumed, 13);
    assert_eq!(result.new_offset, 19);
}

#[test]
fn test_open_line_start_keeps_first_line() {
    let ntf = create_temp_file("one\ntwo\n");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let mut session = new_FileSession(&path, &state_with(&path, 4, identity));
    assert_eq!(read_all_texts(&mut session), vec!["two"]);
}

#[test]
fn test_open_truncated_restarts_at_zero() {
    let ntf = create_temp_file("short\n");
    let path = ntf_fpath(&ntf);
    let identity = FileIdentity::from_metadata(&ntf.as_file().metadata().unwrap());
    let mut session = new_FileSession(&path, &state_with(&path, 1000, identity));
    assert!(session.truncated());
    assert_eq!(session.effective_offset(), 0);
    assert_eq!(read_all_texts(&mut session), vec!["short"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FileSession::next_line
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test_case("", &[]; "empty file")]
#[test_case("\n", &[""]; "one empty line")]
#[test_case("\n\n\n", &["", "", ""]; "three empty lines")]
#[test_case("a\nb\n", &["a", "b"]; "two lines")]
#[test_case("a\r\nb\r\n", &["a", "b"]; "crlf")]
#[test_case("a\rb\n", &["a\rb"]; "lone cr kept")]
#[test_case("a\nfragment", &["a"]; "trailing fragment")]
#[test_case("fragment", &[]; "only fragment")]
fn test_next_line_texts(data: &str, expected: &[&str]) {
    let ntf = create_temp_file(data);
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    assert_eq!(read_all_texts(&mut session), expected);
}

#[test]
fn test_next_line_offsets() {
    let ntf = create_temp_file("ab\r\nc\n\ndef\n");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    let mut lines: Vec<LineRead> = Vec::new();
    while let ResultS3::Found(line) = session.next_line() {
        lines.push(line);
    }
    let offsets: Vec<(FileOffset, u64)> = lines.iter().map(|l| (l.fileoffset, l.len)).collect();
    assert_eq!(offsets, vec![(0, 4), (4, 2), (6, 1), (7, 4)]);
    for pair in lines.windows(2) {
        assert_eq!(pair[0].fileoffset_next(), pair[1].fileoffset);
    }
}

#[test]
fn test_next_line_fragment_not_consumed() {
    let ntf = create_temp_file("full\npart");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    assert!(session.next_line().is_found());
    assert!(session.next_line().is_done());
    assert!(session.next_line().is_done(), "Done again after the fragment");
    assert_eq!(session.fileoffset(), 5);
}

#[test]
fn test_next_line_snapshot_bound() {
    let ntf = create_temp_file("before\n");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    append_file_bytes(&path, b"after\n");
    assert_eq!(read_all_texts(&mut session), vec!["before"]);
    assert_eq!(session.fileoffset(), 7);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FileSession::read_lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// four lines of 5 bytes each
const DATA_4X5: &str = "aaaa\nbbbb\ncccc\ndddd\n";

#[test_case(1, 1, true, 5; "budget 1 reads one line")]
#[test_case(5, 1, true, 5; "budget exactly one line")]
#[test_case(6, 2, true, 10; "budget spills into second line")]
#[test_case(10, 2, true, 10; "budget two lines")]
#[test_case(15, 3, true, 15; "budget three lines")]
#[test_case(20, 4, false, 20; "budget exactly whole file")]
#[test_case(0x10000, 4, false, 20; "budget larger than file")]
fn test_read_lines_budget(budget: u64, nlines: usize, hit_budget: bool, new_offset: FileOffset) {
    let ntf = create_temp_file(DATA_4X5);
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    let result = session.read_lines(budget).unwrap();
    assert_eq!(result.lines.len(), nlines);
    assert_eq!(result.hit_budget, hit_budget);
    assert_eq!(result.new_offset, new_offset);
    assert_eq!(result.bytes_consumed, new_offset);
}

#[test]
fn test_read_lines_long_line_exceeds_budget() {
    let long: String = "x".repeat(1000);
    let data = format!("{}\nshort\n", long);
    let ntf = create_temp_file(&data);
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    let result = session.read_lines(10).unwrap();
    assert_eq!(result.lines.len(), 1);
    assert_eq!(result.lines[0].text, long);
    assert!(result.hit_budget);
    assert_eq!(result.new_offset, 1001);
}

#[test]
fn test_read_lines_only_fragment_after_budget() {
    let ntf = create_temp_file("aaaa\nbb");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    let result = session.read_lines(5).unwrap();
    assert_eq!(result.lines.len(), 1);
    assert!(!result.hit_budget, "a fragment is not more to read");
    assert_eq!(result.new_offset, 5);
}

#[test]
fn test_read_lines_continue_after_budget() {
    let ntf = create_temp_file(DATA_4X5);
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    let first = session.read_lines(10).unwrap();
    let second = session.read_lines(10).unwrap();
    assert_eq!(first.new_offset, 10);
    assert_eq!(second.lines[0].fileoffset, 10);
    assert_eq!(second.new_offset, 20);
    assert!(!second.hit_budget);
}

#[test]
fn test_read_lines_never_past_filesz() {
    let ntf = create_temp_file("one\ntwo\n");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    append_file_bytes(&path, b"three\nfour\n");
    let result = session.read_lines(0x10000).unwrap();
    assert_eq!(result.lines.len(), 2);
    assert_le!(result.new_offset, session.filesz());
    assert!(!result.hit_budget);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_decode_line_invalid_utf8_replaced() {
    let text = decode_line(UTF_8, b"bad \xFF\xFE byte", false);
    assert_eq!(text, "bad \u{FFFD}\u{FFFD} byte");
}

#[test]
fn test_decode_line_bom_only_at_file_start() {
    assert_eq!(decode_line(UTF_8, b"\xEF\xBB\xBFfirst", true), "first");
    assert_eq!(decode_line(UTF_8, b"\xEF\xBB\xBFnot first", false), "\u{FEFF}not first");
}

#[test]
fn test_decode_line_windows_1252() {
    assert_eq!(decode_line(WINDOWS_1252, b"caf\xE9", false), "café");
}

#[test]
fn test_encoding_supported() {
    assert!(encoding_supported(UTF_8));
    assert!(encoding_supported(WINDOWS_1252));
    assert!(!encoding_supported(UTF_16LE));
    assert!(!encoding_supported(UTF_16BE));
}

#[test]
fn test_open_utf16_rejected() {
    // in UTF-16LE the byte 0x0A also starts the second half of "\n\0"
    let ntf = create_temp_file_bytes(b"a\x00b\x00\n\x00c\x00d\x00\n\x00");
    let path = ntf_fpath(&ntf);
    for encoding in [UTF_16LE, UTF_16BE] {
        let err = FileSession::open(&path, &default_state(&path), encoding).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{}", encoding.name());
    }
}

#[test]
fn test_session_encoding_latin1() {
    let ntf = create_temp_file_bytes(b"na\xEFve\ncaf\xE9\n");
    let path = ntf_fpath(&ntf);
    let mut session = FileSession::open(&path, &default_state(&path), WINDOWS_1252).unwrap();
    assert_eq!(read_all_texts(&mut session), vec!["naïve", "café"]);
}

#[test]
fn test_session_bom_removed() {
    let ntf = create_temp_file_bytes(b"\xEF\xBB\xBFhello\nworld\n");
    let path = ntf_fpath(&ntf);
    let mut session = new_FileSession(&path, &default_state(&path));
    assert_eq!(read_all_texts(&mut session), vec!["hello", "world"]);
}
