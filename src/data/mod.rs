// src/data/mod.rs

//! The `data` module is specialized data containers for
//! [`Fingerprint`]s, [`ReadState`]s, [`PatternSet`]s, and [`MatchResult`]s.
//!
//! ## Definitions of data
//!
//! ### Subscription
//!
//! A "subscription" is one consumer's interest in one log file, the pair of
//! a caller-assigned subscription id and a file path. A subscription outlives
//! the process; the engine is run anew for every poll.
//!
//! A subscription is represented by a [`Subscription`].
//!
//! ### Fingerprint
//!
//! A "fingerprint" is the identity of the underlying file at a path
//! (device id and inode id) plus the file size recorded at the last read.
//! A path whose identity changed was _rotated_. A file whose identity is
//! unchanged but which is now smaller than the recorded offset was
//! _truncated_.
//!
//! A fingerprint is represented by a [`Fingerprint`].
//!
//! ### Line
//!
//! A "line" is a sequence of bytes that:
//!
//! * begins after a prior "line" or at the beginning of a file.
//! * ends with a newline byte `'\n'` (optionally preceded by `'\r'`).
//!
//! Trailing bytes at the end of a file without a newline are not yet a
//! "line"; they are left for a later pass.
//!
//! ### Partial read
//!
//! A pass that stopped because of its byte budget (or matched-line cap)
//! while unread data remained. The caller must call again.
//!
//! <br/>
//!
//! Also see [_Overview of readers_].
//!
//! [_Overview of readers_]: crate::readers
//! [`Fingerprint`]: crate::data::fingerprint::Fingerprint
//! [`ReadState`]: crate::data::readstate::ReadState
//! [`Subscription`]: crate::data::readstate::Subscription
//! [`PatternSet`]: crate::data::pattern::PatternSet
//! [`MatchResult`]: crate::data::matchresult::MatchResult

pub mod fingerprint;
pub mod matchresult;
pub mod pattern;
pub mod readstate;
