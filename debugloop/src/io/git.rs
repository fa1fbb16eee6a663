//! Git adapter for checkpoints and rollback.
//!
//! Every successful build is committed so the last commit is always a tree
//! that builds; rollback is `reset --hard` plus `clean` back to it. We keep a
//! small, explicit wrapper around `git` subprocess calls.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Checkpoint;

/// Identity used when the working directory has none configured.
const FALLBACK_NAME: &str = "debugloop";
const FALLBACK_EMAIL: &str = "debugloop@localhost";

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if the working directory is inside a git work tree.
    pub fn is_repo(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    /// `git init` if needed, and make sure commits have an author.
    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        if !self.is_repo()? {
            info!(workdir = %self.workdir.display(), "initializing git repository");
            self.run_checked(&["init", "-q"])?;
        }
        for (key, fallback) in [("user.name", FALLBACK_NAME), ("user.email", FALLBACK_EMAIL)] {
            let configured = self.run(&["config", key])?;
            if !configured.status.success()
                || String::from_utf8_lossy(&configured.stdout).trim().is_empty()
            {
                debug!(key, "setting local git identity");
                self.run_checked(&["config", key, fallback])?;
            }
        }
        Ok(())
    }

    /// Return the current HEAD SHA, or `None` before the first commit.
    pub fn head_sha(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-q", "-m", message])?;
        Ok(true)
    }

    /// Stage everything and commit it as a checkpoint.
    ///
    /// With `allow_empty`, a commit is created even when nothing changed;
    /// otherwise an unchanged tree returns the current HEAD as the checkpoint.
    #[instrument(skip_all, fields(allow_empty = allow_empty))]
    pub fn checkpoint(&self, message: &str, allow_empty: bool) -> Result<Checkpoint> {
        self.add_all()?;
        if allow_empty {
            self.run_checked(&["commit", "-q", "--allow-empty", "-m", message])?;
        } else if !self.commit_staged(message)? && self.head_sha()?.is_none() {
            self.run_checked(&["commit", "-q", "--allow-empty", "-m", message])?;
        }
        let commit = self
            .head_sha()?
            .ok_or_else(|| anyhow!("no HEAD after checkpoint commit"))?;
        debug!(commit = %commit, "checkpoint created");
        Ok(Checkpoint {
            commit,
            message: message.to_string(),
        })
    }

    /// Discard every change since the last commit, including untracked files.
    pub fn reset_to_last_commit(&self) -> Result<()> {
        self.reset_to("HEAD")
    }

    /// Move the branch to `commit` and make the tree match it exactly.
    /// Ignored files (`.debugloop/`) are left alone.
    #[instrument(skip_all, fields(commit = %commit))]
    pub fn reset_to(&self, commit: &str) -> Result<()> {
        let discarded: Vec<String> = self
            .status_porcelain()?
            .into_iter()
            .map(|entry| format!("{} {}", entry.code, entry.path))
            .collect();
        warn!(workdir = %self.workdir.display(), ?discarded, "rolling back");
        self.run_checked(&["reset", "-q", "--hard", commit])?;
        self.run_checked(&["clean", "-q", "-fd"])?;
        Ok(())
    }

    /// Unified diff of the tree between two commits.
    pub fn diff(&self, from: &str, to: &str) -> Result<String> {
        self.run_capture(&["diff", from, to])
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn repo() -> (tempfile::TempDir, Git) {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.init().expect("init");
        (temp, git)
    }

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn first_checkpoint_exists_even_for_an_empty_tree() {
        let (_temp, git) = repo();
        assert_eq!(git.head_sha().expect("head"), None);
        let cp = git.checkpoint("initial", false).expect("checkpoint");
        assert_eq!(git.head_sha().expect("head"), Some(cp.commit));
    }

    #[test]
    fn reset_restores_tracked_and_removes_untracked_files() {
        let (temp, git) = repo();
        let file = temp.path().join("main.c");
        fs::write(&file, "int main(void) { return 1; }\n").expect("write");
        git.checkpoint("initial", false).expect("checkpoint");

        fs::write(&file, "broken").expect("modify");
        fs::write(temp.path().join("stray.o"), "obj").expect("stray");
        git.reset_to_last_commit().expect("reset");

        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "int main(void) { return 1; }\n"
        );
        assert!(!temp.path().join("stray.o").exists());
        assert!(git.status_porcelain().expect("status").is_empty());
    }

    #[test]
    fn reset_to_an_older_commit_restores_its_tree() {
        let (temp, git) = repo();
        let file = temp.path().join("main.c");
        fs::write(&file, "return 1;\n").expect("write");
        let first = git.checkpoint("first", false).expect("first");
        fs::write(&file, "return 0;\n").expect("modify");
        let second = git.checkpoint("second", false).expect("second");
        fs::write(temp.path().join("stray.o"), "obj").expect("stray");

        let diff = git.diff(&first.commit, &second.commit).expect("diff");
        assert!(diff.contains("-return 1;"));
        assert!(diff.contains("+return 0;"));

        git.reset_to(&first.commit).expect("reset");
        assert_eq!(fs::read_to_string(&file).expect("read"), "return 1;\n");
        assert_eq!(git.head_sha().expect("head"), Some(first.commit));
        assert!(!temp.path().join("stray.o").exists());
    }

    #[test]
    fn allow_empty_checkpoint_advances_head() {
        let (_temp, git) = repo();
        let first = git.checkpoint("initial", true).expect("first");
        let second = git.checkpoint("give up", true).expect("second");
        assert_ne!(first.commit, second.commit);
        let unchanged = git.checkpoint("noop", false).expect("noop");
        assert_eq!(unchanged.commit, second.commit);
    }
}
