// src/debug/mod.rs

//! The `debug` module is stderr printing macros, trace rendering helpers,
//! and testing helpers.

#[cfg(test)]
pub mod helpers;

pub mod printers;
