// src/readers/mod.rs

//! "Readers" do the work of a tail pass.
//!
//! ## Overview of readers
//!
//! * A [`StateStore`] persists one [`ReadState`] per subscription and locks a
//!   subscription for the length of a pass.
//! * A [`FileSession`] opens a log file at the reconciled offset and reads
//!   complete lines under a byte budget.
//! * A [`TailMatcher`] drives one pass: `StateStore` ⇄ `FileSession` ⇄
//!   [`PatternSet`], producing a [`MatchResult`].
//! * [`invoke_reader`] is the calling process's side: it runs `ltm -p` and
//!   exchanges [`marshal`] frames with it.
//!
//! _The "Readers" are not rust "Readers"; they do not implement the trait
//! [`Read`]. These are "readers" in an informal sense._
//!
//! [`StateStore`]: crate::readers::statestore::StateStore
//! [`ReadState`]: crate::data::readstate::ReadState
//! [`FileSession`]: crate::readers::filesession::FileSession
//! [`TailMatcher`]: crate::readers::tailmatcher::TailMatcher
//! [`PatternSet`]: crate::data::pattern::PatternSet
//! [`MatchResult`]: crate::data::matchresult::MatchResult
//! [`invoke_reader`]: crate::readers::provider::invoke_reader
//! [`marshal`]: crate::marshal
//! [`Read`]: std::io::Read

pub mod filesession;
pub mod helpers;
pub mod provider;
pub mod statestore;
pub mod tailmatcher;
