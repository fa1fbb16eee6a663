//! `.debugloop/` layout and scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use super::config::{DriverConfig, write_config};

/// Keeps the whole directory out of checkpoints.
const DEBUGLOOP_GITIGNORE: &str = "*\n";

/// All canonical paths within `.debugloop/` for a working directory.
#[derive(Debug, Clone)]
pub struct DriverPaths {
    pub root: PathBuf,
    pub driver_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
    pub snapshots_dir: PathBuf,
}

impl DriverPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let driver_dir = root.join(".debugloop");
        Self {
            root: root.clone(),
            gitignore_path: driver_dir.join(".gitignore"),
            config_path: driver_dir.join("config.toml"),
            runs_dir: driver_dir.join("runs"),
            snapshots_dir: driver_dir.join("snapshots"),
            driver_dir,
        }
    }

    pub fn run(&self, run_id: &str) -> RunPaths {
        RunPaths::new(&self.runs_dir, run_id)
    }

    pub fn snapshot(&self, snapshot_id: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{snapshot_id}.json"))
    }
}

/// Files belonging to one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub conversation_path: PathBuf,
    pub record_path: PathBuf,
    pub succeeded_path: PathBuf,
    pub failed_path: PathBuf,
    pub turns_dir: PathBuf,
}

impl RunPaths {
    fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            conversation_path: dir.join("conversation.json"),
            record_path: dir.join("run.json"),
            succeeded_path: dir.join("succeeded.txt"),
            failed_path: dir.join("failed.txt"),
            turns_dir: dir.join("turns"),
            dir,
        }
    }

    pub fn turn_dir(&self, turn: u32) -> PathBuf {
        self.turns_dir.join(turn.to_string())
    }
}

/// Options for `init_driver`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

/// Create `.debugloop/` scaffolding with a default config in `root`.
///
/// Fails if the config already exists unless `options.force` is set.
pub fn init_driver(root: &Path, options: &InitOptions) -> Result<DriverPaths> {
    let paths = DriverPaths::new(root);
    if paths.driver_dir.exists() && !paths.driver_dir.is_dir() {
        return Err(anyhow!("init: .debugloop exists but is not a directory"));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    ensure_layout(&paths)?;
    write_config(&paths.config_path, &DriverConfig::default())?;
    Ok(paths)
}

/// Create the directories a run writes into; existing content is kept.
pub fn ensure_layout(paths: &DriverPaths) -> Result<()> {
    for dir in [&paths.driver_dir, &paths.runs_dir, &paths.snapshots_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, DEBUGLOOP_GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }
    debug!(dir = %paths.driver_dir.display(), "layout ready");
    Ok(())
}
