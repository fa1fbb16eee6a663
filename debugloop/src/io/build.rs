//! Build runner adapter.
//!
//! The [`BuildRunner`] trait decouples the apply engine from the real build
//! command; tests use scripted runners that never spawn a process.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::error::BuildError;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub workdir: PathBuf,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Result of one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl BuildOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// The failure classification, if the build did not succeed.
    pub fn error(&self) -> Option<BuildError> {
        if self.timed_out {
            Some(BuildError::TimedOut)
        } else if self.exit_code != Some(0) {
            Some(BuildError::Failed {
                code: self.exit_code,
            })
        } else {
            None
        }
    }

    /// Captured stdout and stderr, each under a header, omitting empty streams.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.stdout.trim().is_empty() {
            out.push_str("=== build stdout ===\n");
            out.push_str(self.stdout.trim_end());
            out.push('\n');
        }
        if !self.stderr.trim().is_empty() {
            out.push_str("=== build stderr ===\n");
            out.push_str(self.stderr.trim_end());
            out.push('\n');
        }
        if let Some(err) = self.error() {
            out.push_str(&err.to_string());
            out.push('\n');
        }
        out
    }
}

pub trait BuildRunner {
    /// Run the build. `Err` means the build could not be attempted at all.
    fn run(&self, request: &BuildRequest) -> Result<BuildOutput>;
}

/// Runs the configured build command as a child process.
pub struct ProcessBuildRunner;

impl BuildRunner for ProcessBuildRunner {
    #[instrument(skip_all, fields(command = ?request.command))]
    fn run(&self, request: &BuildRequest) -> Result<BuildOutput> {
        let Some((program, args)) = request.command.split_first() else {
            return Err(BuildError::Spawn("build command is empty".to_string()).into());
        };
        info!(workdir = %request.workdir.display(), "running build");
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .map_err(|err| BuildError::Spawn(format!("{program}: {err:#}")))?;
        Ok(BuildOutput {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path, command: &[&str]) -> BuildRequest {
        BuildRequest {
            workdir: dir.to_path_buf(),
            command: command.iter().map(|s| (*s).to_string()).collect(),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn successful_build_reports_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = ProcessBuildRunner
            .run(&request(temp.path(), &["sh", "-c", "echo built"]))
            .expect("run");
        assert!(out.success());
        assert_eq!(out.error(), None);
        assert!(out.render().contains("built"));
    }

    #[test]
    fn failing_build_carries_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = ProcessBuildRunner
            .run(&request(temp.path(), &["sh", "-c", "echo 'syntax error' >&2; exit 2"]))
            .expect("run");
        assert!(!out.success());
        assert_eq!(out.error(), Some(BuildError::Failed { code: Some(2) }));
        assert!(out.render().contains("syntax error"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ProcessBuildRunner
            .run(&request(temp.path(), &["definitely-not-a-real-build-tool"]))
            .expect_err("spawn");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Spawn(_))
        ));
    }
}
