// src/lib.rs

//! `ltmlib` is the library of the `ltm` log tail-and-match engine.
//!
//! One _tail pass_ returns the lines appended to a log file since the
//! previous pass of the same subscription that match any of the caller's
//! patterns. Read offsets persist across processes and survive rotation and
//! truncation of the log file; a byte budget bounds the work of one pass.
//!
//! See [`TailMatcher`] for the pass, [`readers`] for an overview, and
//! [`marshal`] for the wire protocol of the `ltm` binary.
//!
//! [`TailMatcher`]: crate::readers::tailmatcher::TailMatcher

pub mod common;
pub mod data;
pub mod debug;
pub mod marshal;
pub mod readers;
#[cfg(test)]
pub mod tests;
