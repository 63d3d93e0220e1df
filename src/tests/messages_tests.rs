// src/tests/messages_tests.rs

//! tests for `marshal/messages.rs`

use crate::data::matchresult::{MatchResult, MatchedLine};
use crate::data::pattern::PatternSpec;
use crate::marshal::codec::{Marshal, MarshalError, UnMarshal};
use crate::marshal::messages::{
    marshal_test_line, MarshalTestRequest, ReadRequest, ReadResponse, ResetRequest, WireMessage,
    MARSHAL_TEST_PARTIAL,
};

use ::test_case::test_case;

fn request() -> ReadRequest {
    ReadRequest::new(
        "/var/log/messages",
        "qid-42",
        vec![PatternSpec::new(0, "a-match$"), PatternSpec::new(1, "b-match$")],
    )
}

/// Write `message` as a frame and read it back.
fn through_wire<M: WireMessage>(message: &M) -> M {
    let mut buffer: Vec<u8> = Vec::new();
    message.write_to(&mut buffer).unwrap();
    M::read_from(&mut buffer.as_slice()).unwrap()
}

#[test]
fn test_read_request_field_order() {
    let mut marshal = Marshal::new();
    request().marshal(&mut marshal).unwrap();
    let frame = marshal.into_frame();
    let mut unmarshal = UnMarshal::from_payload(frame[4..].to_vec());
    assert_eq!(unmarshal.get_text().unwrap(), "/var/log/messages");
    assert_eq!(unmarshal.get_text().unwrap(), "qid-42");
    assert_eq!(unmarshal.get_pattern_seq().unwrap().len(), 2);
    unmarshal.finish().unwrap();
}

#[test]
fn test_read_request_through_wire() {
    assert_eq!(through_wire(&request()), request());
}

#[test]
fn test_reset_request() {
    let reset = ResetRequest::new("/var/log/x", "q", true);
    assert_eq!(reset.reset_on_read, 1);
    assert!(reset.is_reset_on_read());
    let back = through_wire(&reset);
    assert_eq!(back, reset);
    assert!(!ResetRequest::new("/var/log/x", "q", false).is_reset_on_read());
}

#[test]
fn test_reset_request_any_nonzero_is_true() {
    let reset = ResetRequest {
        reset_on_read: -3,
        ..ResetRequest::new("/f", "q", false)
    };
    assert!(reset.is_reset_on_read());
}

#[test]
fn test_response_new_empty_echoes() {
    let response = ReadResponse::new_empty(&request());
    assert!(response.echoes(&request()));
    assert_eq!(response.matched_line_count, 0);
    assert!(!response.is_partial_read());
    assert!(response.matched_lines.is_empty());
}

#[test]
fn test_response_echoes_mismatch() {
    let response = ReadResponse::new_empty(&request());
    let mut other = request();
    other.patterns.pop();
    assert!(!response.echoes(&other));
    let mut other = request();
    other.subscription_id = String::from("other");
    assert!(!response.echoes(&other));
}

#[test_case(false, 65536, 0; "not partial")]
#[test_case(true, 65536, 65536; "partial default budget")]
#[test_case(true, 10, 10; "partial small budget")]
#[test_case(true, 0x4000_0000, 0x4000_0000; "partial max budget")]
#[test_case(true, u64::MAX, i32::MAX; "partial saturates")]
fn test_response_from_match_result(partial: bool, budget: u64, expected: i32) {
    let mut result = MatchResult::new_empty("/f", "q", vec![PatternSpec::new(0, "x")]);
    result.matched_lines.push(MatchedLine {
        indices: vec![0],
        text: String::from("x1"),
        offset: 0,
    });
    result.was_partial_read = partial;
    let response = ReadResponse::from_match_result(&result, budget);
    assert_eq!(response.was_partial_read, expected);
    assert_eq!(response.is_partial_read(), partial);
    assert_eq!(response.matched_line_count, 1);
    assert_eq!(response.matched_lines, vec!["x1"]);
    assert_eq!(response.patterns, result.patterns);
}

#[test_case(0; "no lines")]
#[test_case(20; "twenty lines")]
#[test_case(10000; "ten thousand lines")]
fn test_response_through_wire(count: i32) {
    let test = MarshalTestRequest {
        request: request(),
        matched_lines_count_hint: count,
    };
    let response = ReadResponse::new_marshal_test(&test);
    assert_eq!(response.matched_line_count, count);
    assert_eq!(response.was_partial_read, MARSHAL_TEST_PARTIAL);
    let back = through_wire(&response);
    assert_eq!(back, response);
    assert!(back.echoes(&request()));
    for (at, line) in back.matched_lines.iter().enumerate() {
        assert_eq!(*line, marshal_test_line(at as i32));
    }
}

#[test]
fn test_marshal_test_request_through_wire() {
    let test = MarshalTestRequest {
        request: request(),
        matched_lines_count_hint: 20,
    };
    assert_eq!(through_wire(&test), test);
}

#[test]
fn test_marshal_test_negative_hint() {
    let test = MarshalTestRequest {
        request: request(),
        matched_lines_count_hint: -1,
    };
    let response = ReadResponse::new_marshal_test(&test);
    assert_eq!(response.matched_line_count, 0);
}

#[test]
fn test_marshal_test_line() {
    assert_eq!(marshal_test_line(0), "This is entry number 0 in the vector");
    assert_eq!(marshal_test_line(9999), "This is entry number 9999 in the vector");
}

#[test]
fn test_response_count_mismatch() {
    let mut response = ReadResponse::new_empty(&request());
    response.matched_line_count = 3;
    let mut buffer: Vec<u8> = Vec::new();
    response.write_to(&mut buffer).unwrap();
    match ReadResponse::read_from(&mut buffer.as_slice()) {
        Err(MarshalError::Framing(_)) => {}
        other => panic!("expected Framing, got {:?}", other),
    }
}

#[test]
fn test_read_from_trailing_value() {
    let mut marshal = Marshal::new();
    ResetRequest::new("/f", "q", false).marshal(&mut marshal).unwrap();
    marshal.put_int(0);
    let frame = marshal.into_frame();
    match ResetRequest::read_from(&mut frame.as_slice()) {
        Err(MarshalError::Framing(_)) => {}
        other => panic!("expected Framing, got {:?}", other),
    }
}

#[test]
fn test_read_request_as_reset_request_fails() {
    let mut buffer: Vec<u8> = Vec::new();
    request().write_to(&mut buffer).unwrap();
    assert!(matches!(
        ResetRequest::read_from(&mut buffer.as_slice()),
        Err(MarshalError::UnexpectedTag { .. })
    ));
}
