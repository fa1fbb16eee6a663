//! Debugger session abstraction.
//!
//! The [`DebuggerSession`] trait is the only view the loop has of the debugged
//! process. [`gdb::GdbSession`] drives a real gdb over its machine interface;
//! tests use a scripted fake.

pub mod gdb;
pub mod mi;

use anyhow::Result;

/// Reply to a debugger command or restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReply {
    pub success: bool,
    pub output: String,
}

impl SessionReply {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

pub trait DebuggerSession {
    /// Describe where and why the process last stopped.
    fn stop_info(&mut self) -> Result<String>;

    /// Run one debugger command. Command failures are `Ok` with `success: false`;
    /// `Err` means the session itself is broken.
    fn execute_command(&mut self, cmd: &str) -> Result<SessionReply>;

    /// Kill the process if it is alive, launch it again and wait for the first stop.
    fn restart(&mut self) -> Result<SessionReply>;

    fn has_exited(&self) -> bool;

    /// Exit status once [`has_exited`](Self::has_exited) is true.
    fn exit_status_code(&self) -> Option<i32>;
}
