// src/marshal/mod.rs

//! The `marshal` module is the binary wire protocol between the `ltm`
//! engine process and the process calling it.
//!
//! [`codec`] frames and tags primitive values. [`messages`] defines the
//! request and response messages built from them.
//!
//! A caller writes one request frame to the standard input of `ltm` and
//! reads one response frame from its standard output. See
//! [`invoke_reader`].
//!
//! [`invoke_reader`]: crate::readers::provider::invoke_reader

pub mod codec;
pub mod messages;
