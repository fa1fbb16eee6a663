//! Deterministic, pure logic shared by the debug loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values (text, JSON, edits) and return deterministic outputs suitable for
//! tests.

pub mod apply;
pub mod error;
pub mod intents;
pub mod merge;
pub mod patch;
pub mod source_window;
pub mod transaction;
pub mod types;
