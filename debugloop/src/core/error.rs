//! Error taxonomy for actions that the loop reports back as turn content.
//!
//! Only [`FatalLaunchError`] ends a run; every other error here is rendered into
//! an [`ActionResult`](super::types::ActionResult) so the decision service can
//! adapt.

use thiserror::Error;

/// A proposed edit does not match the current source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("{path} is outside the working directory")]
    OutsideWorkdir { path: String },

    #[error("edit {edit}: start_line must be >= 1")]
    ZeroLine { edit: usize },

    #[error(
        "edit {edit}: line {line} does not match.\nexpected: {expected:?}\nfound:    {found:?}"
    )]
    Mismatch {
        edit: usize,
        line: usize,
        expected: String,
        found: String,
    },

    #[error("edit {edit}: start_line {line} is past the end of the file ({total} lines)")]
    PastEnd {
        edit: usize,
        line: usize,
        total: usize,
    },

    #[error("edits {first} and {second} overlap")]
    Overlap { first: usize, second: usize },

    #[error("the edits do not change {path}")]
    NoChange { path: String },
}

/// A unified diff could not be applied (dry run or real).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("{path}: hunk {hunk} does not apply at line {line}")]
    HunkMismatch {
        path: String,
        hunk: usize,
        line: usize,
    },

    #[error("{path}: {reason}")]
    Io { path: String, reason: String },
}

/// The build failed after a patch was applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("build exited with status {code:?}")]
    Failed { code: Option<i32> },

    #[error("build timed out")]
    TimedOut,

    #[error("could not run build: {0}")]
    Spawn(String),
}

/// The debugger session could not service a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("debugger did not respond within {secs}s")]
    Timeout { secs: u64 },

    #[error("debugger exited unexpectedly")]
    Disconnected,

    #[error("debugger i/o failed: {0}")]
    Io(String),
}

/// The debugged process or its debugger could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to launch {target}: {reason}")]
pub struct FatalLaunchError {
    pub target: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_line_and_both_texts() {
        let err = ValidationError::Mismatch {
            edit: 1,
            line: 10,
            expected: "return 1;".to_string(),
            found: "return 2;".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 10"));
        assert!(msg.contains("return 1;"));
        assert!(msg.contains("return 2;"));
    }
}
