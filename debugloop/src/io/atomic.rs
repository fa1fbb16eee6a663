//! Atomic file writes (temp file + rename).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Write `contents` to `path` via a sibling temp file, creating parent dirs.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Pretty-print `value` as JSON with a trailing newline and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_json_creates_parents_and_leaves_no_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("a/b/value.json");
        write_json(&path, &serde_json::json!({"k": 1})).expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "{\n  \"k\": 1\n}\n");
        let names: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("value.json")]);
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("f.txt");
        write_atomic(&path, "one").expect("first");
        write_atomic(&path, "two").expect("second");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
    }
}
