//! Source changes each run made, from the commit it started on to the one it
//! ended on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use debugloop::io::git::Git;
use debugloop::io::init::DriverPaths;
use debugloop::io::run_record::load_run_record;

use crate::conversation::{case_dir, segment};

#[derive(Debug, Clone)]
pub struct RunDiff {
    pub run_dir: PathBuf,
    pub segment: String,
    pub stop: Option<String>,
    pub diff: String,
}

/// Diff every finished run recorded below `root`.
///
/// Unfinished runs and runs whose commits cannot be diffed are skipped with a
/// warning.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn load_run_diffs(root: &Path) -> Result<(Vec<RunDiff>, Vec<String>)> {
    let mut diffs = Vec::new();
    let mut warnings = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() || entry.file_name() != "run.json" {
            continue;
        }
        let Some(run_dir) = entry.path().parent() else {
            continue;
        };
        let project = case_dir(run_dir);
        let Some(run_id) = run_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        match diff_run(&project, &run_id) {
            Ok(Some((stop, diff))) => diffs.push(RunDiff {
                run_dir: run_dir.to_path_buf(),
                segment: segment(&project),
                stop,
                diff,
            }),
            Ok(None) => warnings.push(format!("skip {}: run did not finish", run_dir.display())),
            Err(err) => warnings.push(format!("skip {}: {err:#}", run_dir.display())),
        }
    }
    debug!(runs = diffs.len(), skipped = warnings.len(), "run diffs loaded");
    Ok((diffs, warnings))
}

fn diff_run(project: &Path, run_id: &str) -> Result<Option<(Option<String>, String)>> {
    let run = DriverPaths::new(project).run(run_id);
    let Some(record) = load_run_record(&run)? else {
        return Ok(None);
    };
    let Some(final_commit) = &record.final_commit else {
        return Ok(None);
    };
    let diff = Git::new(project).diff(&record.start_commit, final_commit)?;
    Ok(Some((record.stop, diff)))
}
