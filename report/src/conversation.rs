//! Discovery and loading of recorded conversation logs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use debugloop::core::types::Turn;
use debugloop::io::outcome::has_succeeded;

/// One run's conversation plus where it was found.
#[derive(Debug, Clone)]
pub struct RunLog {
    /// Directory holding `conversation.json`.
    pub dir: PathBuf,
    /// Leading segment of the case directory name (text before the first `_`).
    pub segment: String,
    pub success: bool,
    pub turns: Vec<Turn>,
}

/// Load every `conversation.json` below `root`, sorted by path.
///
/// Unreadable or unparsable logs are skipped with a warning.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn load_run_logs(root: &Path) -> Result<(Vec<RunLog>, Vec<String>)> {
    let mut logs = Vec::new();
    let mut warnings = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() || entry.file_name() != "conversation.json" {
            continue;
        }
        let path = entry.path();
        let turns: Vec<Turn> = match fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse conversation"))
        {
            Ok(turns) => turns,
            Err(err) => {
                warnings.push(format!("skip {}: {err:#}", path.display()));
                continue;
            }
        };
        let dir = path.parent().unwrap_or(root).to_path_buf();
        logs.push(RunLog {
            segment: segment(&case_dir(&dir)),
            success: has_succeeded(&dir),
            dir,
            turns,
        });
    }
    debug!(runs = logs.len(), skipped = warnings.len(), "conversations loaded");
    Ok((logs, warnings))
}

/// The directory a run belongs to: the project holding `.debugloop/` for
/// `.debugloop/runs/<id>/`, otherwise the run directory itself.
pub fn case_dir(run_dir: &Path) -> PathBuf {
    let mut ancestors = run_dir.ancestors().skip(1);
    let runs = ancestors.next();
    let driver = ancestors.next();
    let project = ancestors.next();
    if let (Some(runs), Some(driver), Some(project)) = (runs, driver, project)
        && runs.file_name().is_some_and(|n| n == "runs")
        && driver.file_name().is_some_and(|n| n == ".debugloop")
    {
        return project.to_path_buf();
    }
    run_dir.to_path_buf()
}

/// Text before the first `_` of the directory name.
pub fn segment(dir: &Path) -> String {
    dir.file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.split('_').next().unwrap_or_default().to_string()
        })
        .unwrap_or_default()
}
