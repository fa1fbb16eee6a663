//! I/O adapters for the debug loop.

pub mod atomic;
pub mod build;
pub mod config;
pub mod debugger;
pub mod git;
pub mod init;
pub mod outcome;
pub mod process;
pub mod prompt;
pub mod run_record;
pub mod service;
pub mod session_log;
pub mod turn_log;
pub mod workspace;
