//! Source access inside the working directory.
//!
//! All paths coming from the decision service go through [`resolve`], which
//! keeps them inside the working directory and away from the repository and
//! driver metadata.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::apply::{self, FilePatch};
use crate::core::error::{ApplyError, ValidationError};
use crate::core::patch::{PatchPlan, build_patch};
use crate::core::types::Edit;
use crate::io::atomic::write_atomic;

/// Directories that are never exposed as source.
const HIDDEN_ROOTS: &[&str] = &[".git", ".debugloop"];

/// A path that is known to live inside the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    /// Absolute (or workdir-joined) path on disk.
    pub abs: PathBuf,
    /// Forward-slash path relative to the working directory.
    pub rel: String,
}

/// Resolve `file` against `workdir` lexically, rejecting anything that escapes it.
pub fn resolve(workdir: &Path, file: &str) -> Result<SourcePath, ValidationError> {
    let outside = || ValidationError::OutsideWorkdir {
        path: file.to_string(),
    };
    let candidate = Path::new(file.trim());
    let relative = if candidate.is_absolute() {
        let root = fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());
        candidate
            .strip_prefix(&root)
            .or_else(|_| candidate.strip_prefix(workdir))
            .map_err(|_| outside())?
            .to_path_buf()
    } else {
        candidate.to_path_buf()
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop().ok_or_else(outside)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }
    match parts.first() {
        None => return Err(outside()),
        Some(first) if HIDDEN_ROOTS.contains(&first.as_str()) => return Err(outside()),
        Some(_) => {}
    }

    let rel = parts.join("/");
    Ok(SourcePath {
        abs: workdir.join(&rel),
        rel,
    })
}

/// Read a source file below `workdir`.
pub fn read_source(workdir: &Path, file: &str) -> Result<(SourcePath, String), ValidationError> {
    let path = resolve(workdir, file)?;
    let text = fs::read_to_string(&path.abs).map_err(|err| ValidationError::Unreadable {
        path: path.rel.clone(),
        reason: err.to_string(),
    })?;
    Ok((path, text))
}

/// Validate line-anchored edits against the file on disk and build the diff.
///
/// Nothing is written.
#[instrument(skip_all, fields(file, edits = edits.len()))]
pub fn validate_and_diff(
    workdir: &Path,
    file: &str,
    edits: &[Edit],
    context_lines: usize,
) -> Result<PatchPlan, ValidationError> {
    let (path, original) = read_source(workdir, file)?;
    let plan = build_patch(&path.rel, &original, edits, context_lines)?;
    debug!(path = %path.rel, diff_bytes = plan.diff.len(), "edits validated");
    Ok(plan)
}

/// Apply `diff` in memory against the file it names. The tree is untouched.
pub fn dry_run(workdir: &Path, diff: &str) -> Result<(FilePatch, SourcePath, String), ApplyError> {
    let patch = apply::parse(diff)?;
    let path = resolve(workdir, &patch.path).map_err(|err| ApplyError::Io {
        path: patch.path.clone(),
        reason: err.to_string(),
    })?;
    let original = fs::read_to_string(&path.abs).map_err(|err| ApplyError::Io {
        path: path.rel.clone(),
        reason: err.to_string(),
    })?;
    let updated = patch.apply_to(&original)?;
    Ok((patch, path, updated))
}

/// Apply `diff` to the working tree.
#[instrument(skip_all)]
pub fn apply_to_disk(workdir: &Path, diff: &str) -> Result<String, ApplyError> {
    let (_, path, updated) = dry_run(workdir, diff)?;
    write_atomic(&path.abs, &updated).map_err(|err| ApplyError::Io {
        path: path.rel.clone(),
        reason: format!("{err:#}"),
    })?;
    debug!(path = %path.rel, "patch applied");
    Ok(path.rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EditFrom, EditTo};

    fn edit(line: usize, expected: &str, replacement: &str) -> Edit {
        Edit {
            from: EditFrom {
                start_line: line,
                expected_text: expected.to_string(),
            },
            to: EditTo {
                start_line: line,
                replacement_text: replacement.to_string(),
            },
        }
    }

    #[test]
    fn resolve_normalizes_relative_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = resolve(temp.path(), "./src/../src/main.c").expect("resolve");
        assert_eq!(path.rel, "src/main.c");
        assert_eq!(path.abs, temp.path().join("src/main.c"));
    }

    #[test]
    fn resolve_accepts_absolute_paths_inside_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let abs = temp.path().join("main.c");
        let path = resolve(temp.path(), &abs.to_string_lossy()).expect("resolve");
        assert_eq!(path.rel, "main.c");
    }

    #[test]
    fn resolve_rejects_escapes_and_metadata() {
        let temp = tempfile::tempdir().expect("tempdir");
        for file in ["../etc/passwd", "/etc/passwd", "a/../../b", ".git/config", ".debugloop/config.toml", "."] {
            assert!(
                matches!(resolve(temp.path(), file), Err(ValidationError::OutsideWorkdir { .. })),
                "{file} should be rejected"
            );
        }
    }

    #[test]
    fn unreadable_file_is_a_validation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = validate_and_diff(temp.path(), "missing.c", &[edit(1, "a", "b")], 3)
            .expect_err("missing");
        assert!(matches!(err, ValidationError::Unreadable { .. }));
    }

    #[test]
    fn mismatch_leaves_file_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("main.c");
        fs::write(&file, "int x;\n").expect("write");
        let err = validate_and_diff(temp.path(), "main.c", &[edit(1, "int y;", "int z;")], 3)
            .expect_err("mismatch");
        assert!(matches!(err, ValidationError::Mismatch { line: 1, .. }));
        assert_eq!(fs::read_to_string(&file).expect("read"), "int x;\n");
    }

    #[test]
    fn validated_diff_applies_to_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("main.c");
        fs::write(&file, "int main(void) {\n    return 1;\n}\n").expect("write");

        let plan = validate_and_diff(temp.path(), "main.c", &[edit(2, "return 1;", "    return 0;")], 3)
            .expect("valid");
        let (_, _, preview) = dry_run(temp.path(), &plan.diff).expect("dry run");
        assert_eq!(preview, plan.modified);
        assert_eq!(fs::read_to_string(&file).expect("read"), plan.original);

        let rel = apply_to_disk(temp.path(), &plan.diff).expect("apply");
        assert_eq!(rel, "main.c");
        assert_eq!(fs::read_to_string(&file).expect("read"), plan.modified);
    }
}
