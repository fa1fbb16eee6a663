//! Durable conversation log with interim snapshots.
//!
//! The log is owned by the loop and only ever appended to. Each
//! [`SessionLog::persist`] rewrites the run's stable `conversation.json` and
//! writes a new, never-overwritten snapshot that a later run can resume from.

use std::fs;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::atomic::write_json;
use super::init::DriverPaths;
use super::run_record::load_run_record;
use crate::core::types::Turn;

/// A serialized copy of the turn sequence at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub run_id: String,
    pub created_at: String,
    /// Commit the run started from; the tree a replay has to begin on.
    #[serde(default)]
    pub start_commit: Option<String>,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    run_id: String,
    start_commit: Option<String>,
    turns: Vec<Turn>,
    saves: u32,
}

impl SessionLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            start_commit: None,
            turns: Vec::new(),
            saves: 0,
        }
    }

    /// Record the commit the run started from in every snapshot.
    pub fn starting_at(mut self, commit: impl Into<String>) -> Self {
        self.start_commit = Some(commit.into());
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Write the stable log and a fresh snapshot; returns the snapshot id.
    #[instrument(skip_all, fields(run_id = %self.run_id, turns = self.turns.len()))]
    pub fn persist(&mut self, paths: &DriverPaths) -> Result<String> {
        let run = paths.run(&self.run_id);
        write_json(&run.conversation_path, &self.turns)?;

        self.saves += 1;
        let snapshot = Snapshot {
            id: format!("{}-turn-{:04}", self.run_id, self.saves),
            run_id: self.run_id.clone(),
            created_at: Utc::now().to_rfc3339(),
            start_commit: self.start_commit.clone(),
            turns: self.turns.clone(),
        };
        let path = paths.snapshot(&snapshot.id);
        if path.exists() {
            bail!("snapshot {} already exists", path.display());
        }
        write_json(&path, &snapshot)?;
        debug!(snapshot = %snapshot.id, "session persisted");
        Ok(snapshot.id)
    }
}

/// Load a resume point: a snapshot id, or a run id (its stable log).
#[instrument(skip(paths))]
pub fn load_snapshot(paths: &DriverPaths, id: &str) -> Result<Snapshot> {
    let snapshot_path = paths.snapshot(id);
    if snapshot_path.is_file() {
        let contents = fs::read_to_string(&snapshot_path)
            .with_context(|| format!("read snapshot {}", snapshot_path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("parse snapshot {}", snapshot_path.display()))?;
        info!(turns = snapshot.turns.len(), "loaded snapshot");
        return Ok(snapshot);
    }

    let conversation_path = paths.run(id).conversation_path;
    if conversation_path.is_file() {
        let contents = fs::read_to_string(&conversation_path)
            .with_context(|| format!("read conversation {}", conversation_path.display()))?;
        let turns: Vec<Turn> = serde_json::from_str(&contents)
            .with_context(|| format!("parse conversation {}", conversation_path.display()))?;
        let record = load_run_record(&paths.run(id))?;
        info!(turns = turns.len(), "loaded run conversation");
        return Ok(Snapshot {
            id: id.to_string(),
            run_id: id.to_string(),
            created_at: record
                .as_ref()
                .map(|r| r.started_at.clone())
                .unwrap_or_default(),
            start_commit: record.map(|r| r.start_commit),
            turns,
        });
    }

    bail!("no snapshot or run named '{id}' under {}", paths.driver_dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ToolCall;
    use crate::io::run_record::{RunRecord, write_run_record};

    fn sample_log() -> SessionLog {
        let mut log = SessionLog::new("run-1").starting_at("abc123");
        log.append(Turn::system("sys"));
        log.append(Turn::user("stopped"));
        log.append(Turn::assistant(None, vec![ToolCall::new("c1", "run_debugger_command", r#"{"cmd":"bt"}"#)]));
        log.append(Turn::tool("c1", "#0 main"));
        log
    }

    #[test]
    fn persist_writes_stable_log_and_distinct_snapshots() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = DriverPaths::new(temp.path());
        let mut log = sample_log();

        let first = log.persist(&paths).expect("persist");
        log.append(Turn::user("next?"));
        let second = log.persist(&paths).expect("persist");

        assert_eq!(first, "run-1-turn-0001");
        assert_eq!(second, "run-1-turn-0002");
        let loaded = load_snapshot(&paths, &first).expect("first");
        assert_eq!(loaded.turns.len(), 4);
        assert_eq!(loaded.start_commit.as_deref(), Some("abc123"));
        assert_eq!(load_snapshot(&paths, &second).expect("second").turns.len(), 5);

        let stable: Vec<Turn> = serde_json::from_str(
            &fs::read_to_string(paths.run("run-1").conversation_path).expect("read"),
        )
        .expect("parse");
        assert_eq!(stable, log.turns());
    }

    #[test]
    fn run_id_resolves_to_stable_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = DriverPaths::new(temp.path());
        let mut log = sample_log();
        log.persist(&paths).expect("persist");

        let snapshot = load_snapshot(&paths, "run-1").expect("load");
        assert_eq!(snapshot.run_id, "run-1");
        assert_eq!(snapshot.start_commit, None);

        write_run_record(&paths.run("run-1"), &RunRecord::started("run-1", "abc123"))
            .expect("record");
        let snapshot = load_snapshot(&paths, "run-1").expect("load");
        assert_eq!(snapshot.start_commit.as_deref(), Some("abc123"));
        assert_eq!(snapshot.turns, log.turns());
    }

    #[test]
    fn unknown_id_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = DriverPaths::new(temp.path());
        let err = load_snapshot(&paths, "nope").expect_err("missing");
        assert!(err.to_string().contains("nope"));
    }
}
