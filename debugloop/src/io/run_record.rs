//! `runs/<run-id>/run.json`: the commits a run started from and ended on.
//!
//! The start commit is where a resumed run rewinds the tree to before
//! replaying; the pair of commits is what `report diffs` compares.

use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::atomic::write_json;
use super::init::RunPaths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub start_commit: String,
    pub started_at: String,
    #[serde(default)]
    pub final_commit: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    /// `exited`, `gave_up` or `turn_limit`.
    #[serde(default)]
    pub stop: Option<String>,
}

impl RunRecord {
    pub fn started(run_id: impl Into<String>, start_commit: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            start_commit: start_commit.into(),
            started_at: Utc::now().to_rfc3339(),
            final_commit: None,
            finished_at: None,
            stop: None,
        }
    }

    pub fn finished(mut self, final_commit: Option<String>, stop: &str) -> Self {
        self.final_commit = final_commit;
        self.finished_at = Some(Utc::now().to_rfc3339());
        self.stop = Some(stop.to_string());
        self
    }
}

pub fn write_run_record(run: &RunPaths, record: &RunRecord) -> Result<()> {
    write_json(&run.record_path, record)
}

/// The run's record, or `None` when the run predates it.
pub fn load_run_record(run: &RunPaths) -> Result<Option<RunRecord>> {
    if !run.record_path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&run.record_path)
        .with_context(|| format!("read {}", run.record_path.display()))?;
    let record = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", run.record_path.display()))?;
    Ok(Some(record))
}
