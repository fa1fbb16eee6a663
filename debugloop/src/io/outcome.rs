//! Terminal-state sentinel files (`succeeded.txt` / `failed.txt`).

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use super::atomic::write_atomic;
use super::init::RunPaths;

/// Write the success or failure marker for a finished run.
pub fn write_marker(run: &RunPaths, succeeded: bool, reason: &str) -> Result<()> {
    let path = if succeeded {
        &run.succeeded_path
    } else {
        &run.failed_path
    };
    write_atomic(path, &format!("{}\n{}\n", Utc::now().to_rfc3339(), reason.trim()))
}

/// True if a run directory carries the success marker.
pub fn has_succeeded(run_dir: &Path) -> bool {
    run_dir.join("succeeded.txt").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::init::DriverPaths;

    #[test]
    fn markers_are_exclusive_per_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = DriverPaths::new(temp.path()).run("run-1");
        write_marker(&run, false, "gave up").expect("write");

        assert!(run.failed_path.is_file());
        assert!(!run.succeeded_path.exists());
        assert!(!has_succeeded(&run.dir));
        assert!(
            std::fs::read_to_string(&run.failed_path)
                .expect("read")
                .ends_with("gave up\n")
        );

        write_marker(&run, true, "exited with status 0").expect("write");
        assert!(has_succeeded(&run.dir));
    }
}
