//! Line-anchored patch synthesis.
//!
//! Edits name a 1-based `from.start_line` in the file as it is *before* the
//! batch is applied, plus the text expected there. Validation compares lines
//! with surrounding whitespace trimmed and fails on the first mismatch; the
//! file is only ever touched later, by the apply engine, using the diff built
//! here.

use similar::TextDiff;

use super::error::ValidationError;
use super::types::Edit;

/// A validated edit batch and the unified diff that realizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    pub path: String,
    pub original: String,
    pub modified: String,
    pub diff: String,
}

/// One edit after validation, anchored to zero-based line indices.
#[derive(Debug, Clone)]
struct Anchored<'a> {
    number: usize,
    start: usize,
    len: usize,
    replacement: &'a str,
}

/// Validate `edits` against `original` and build the unified diff.
///
/// `path` labels both sides of the diff.
pub fn build_patch(
    path: &str,
    original: &str,
    edits: &[Edit],
    context_lines: usize,
) -> Result<PatchPlan, ValidationError> {
    let lines: Vec<&str> = original.lines().collect();
    let mut anchored = Vec::with_capacity(edits.len());

    for (idx, edit) in edits.iter().enumerate() {
        anchored.push(check_edit(idx + 1, edit, &lines)?);
    }

    anchored.sort_by_key(|a| (a.start, a.number));
    for pair in anchored.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start < prev.start + prev.len || next.start == prev.start {
            return Err(ValidationError::Overlap {
                first: prev.number.min(next.number),
                second: prev.number.max(next.number),
            });
        }
    }

    let mut updated: Vec<String> = lines.iter().map(|l| (*l).to_string()).collect();
    for edit in anchored.iter().rev() {
        let replacement = edit.replacement.lines().map(str::to_string);
        updated.splice(edit.start..edit.start + edit.len, replacement);
    }

    let modified = join_lines(
        &updated,
        line_ending(original),
        original.is_empty() || original.ends_with('\n'),
    );
    if modified == original {
        return Err(ValidationError::NoChange {
            path: path.to_string(),
        });
    }

    let diff = unified_diff(path, original, &modified, context_lines);
    Ok(PatchPlan {
        path: path.to_string(),
        original: original.to_string(),
        modified,
        diff,
    })
}

fn check_edit<'a>(
    number: usize,
    edit: &'a Edit,
    lines: &[&str],
) -> Result<Anchored<'a>, ValidationError> {
    if edit.from.start_line == 0 || edit.to.start_line == 0 {
        return Err(ValidationError::ZeroLine { edit: number });
    }
    let start = edit.from.start_line - 1;
    let expected: Vec<&str> = edit.from.expected_text.lines().collect();

    if expected.is_empty() {
        if start > lines.len() {
            return Err(ValidationError::PastEnd {
                edit: number,
                line: edit.from.start_line,
                total: lines.len(),
            });
        }
    } else {
        for (offset, want) in expected.iter().enumerate() {
            let line_no = start + offset + 1;
            let Some(found) = lines.get(start + offset) else {
                return Err(ValidationError::PastEnd {
                    edit: number,
                    line: line_no,
                    total: lines.len(),
                });
            };
            if found.trim() != want.trim() {
                return Err(ValidationError::Mismatch {
                    edit: number,
                    line: line_no,
                    expected: want.trim().to_string(),
                    found: found.trim().to_string(),
                });
            }
        }
    }

    Ok(Anchored {
        number,
        start,
        len: expected.len(),
        replacement: &edit.to.replacement_text,
    })
}

/// Line terminator used by `text`.
pub(crate) fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Join lines with `eol`, terminating the last one when `trailing` is set.
pub(crate) fn join_lines<S: AsRef<str>>(lines: &[S], eol: &str, trailing: bool) -> String {
    let mut out = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(eol);
    if trailing && !lines.is_empty() {
        out.push_str(eol);
    }
    out
}

/// Unified diff between two texts, labelling both sides with `path`.
pub fn unified_diff(path: &str, original: &str, modified: &str, context_lines: usize) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(context_lines)
        .header(path, path)
        .to_string()
}
