// src/tests/mod.rs

//! Tests for _ltmlib_.
//!
//! Tests are placed at `src/tests/`, inside the `ltmlib`. The author concluded
//! this is a reasonable trade-off of separation and access.
//!
//! Tests placed at top-level path `tests/` do not have crate-internal
//! visibility. Those tests run the `ltm` binary as a calling process would.

pub mod filesession_tests;
pub mod messages_tests;
pub mod pattern_tests;
