// src/tests/pattern_tests.rs

//! tests for `data/pattern.rs`

use crate::common::PatternIndex;
use crate::data::pattern::{Pattern, PatternSet, PatternSpec};

use ::test_case::test_case;

fn specs(expressions: &[(PatternIndex, &str)]) -> Vec<PatternSpec> {
    expressions
        .iter()
        .map(|(index, expression)| PatternSpec::new(*index, expression))
        .collect()
}

#[test]
fn test_pattern_compile() {
    let pattern = Pattern::compile(&PatternSpec::new(4, "err(or)?")).unwrap();
    assert_eq!(pattern.index, 4);
    assert_eq!(pattern.as_str(), "err(or)?");
    assert!(pattern.is_match("an error"));
    assert!(!pattern.is_match("fine"));
}

#[test]
fn test_pattern_compile_invalid() {
    let err = Pattern::compile(&PatternSpec::new(9, "(unclosed")).unwrap_err();
    assert_eq!(err.index, 9);
    assert!(!err.message.is_empty());
    assert!(err.to_string().starts_with("invalid pattern at index 9: "), "{}", err);
}

#[test]
fn test_patternset_empty_matches_nothing() {
    let set = PatternSet::compile(&[]).unwrap();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    assert!(!set.matches("anything"));
    assert!(!set.matches(""));
    assert!(set.matching_indices("anything").is_empty());
}

#[test_case("a-match", &[0]; "only first")]
#[test_case("b-match", &[1]; "only second")]
#[test_case("no-match", &[]; "neither")]
#[test_case("ab-match", &[0, 1]; "both")]
fn test_patternset_matching_indices(line: &str, expected: &[PatternIndex]) {
    let set = PatternSet::compile(&specs(&[(0, "^a.*-match$"), (1, "b-match$")])).unwrap();
    assert_eq!(set.matching_indices(line), expected);
    assert_eq!(set.matches(line), !expected.is_empty());
}

#[test]
fn test_patternset_indices_sorted_regardless_of_order() {
    let set = PatternSet::compile(&specs(&[(7, "x"), (2, "x"), (5, "y")])).unwrap();
    assert_eq!(set.matching_indices("x y"), vec![2, 5, 7]);
    let got: Vec<PatternIndex> = set.iter().map(|p| p.index).collect();
    assert_eq!(got, vec![7, 2, 5], "iteration keeps request order");
}

#[test]
fn test_patternset_invalid_rejects_all() {
    let err = PatternSet::compile(&specs(&[(0, "good"), (1, "[bad"), (2, "also good")])).unwrap_err();
    assert_eq!(err.index, 1);
}

#[test]
fn test_patternset_duplicate_index() {
    let err = PatternSet::compile(&specs(&[(3, "a"), (3, "b")])).unwrap_err();
    assert_eq!(err.index, 3);
    assert_eq!(err.message, "duplicate pattern index");
}

#[test]
fn test_patternset_negative_index() {
    let set = PatternSet::compile(&specs(&[(-1, "neg")])).unwrap();
    assert_eq!(set.matching_indices("negative"), vec![-1]);
}

#[test]
fn test_patternset_unicode() {
    let set = PatternSet::compile(&specs(&[(0, "Ünïcödé"), (1, r"\p{Greek}+")])).unwrap();
    assert_eq!(set.matching_indices("warn Ünïcödé λόγος"), vec![0, 1]);
}
