//! In-memory application of a single-file unified diff.
//!
//! This is the dry-run half of the apply engine: the same parsed patch is
//! applied to the text first, and only a successful result is written to disk.

use std::sync::LazyLock;

use regex::Regex;

use super::error::ApplyError;
use super::patch::{join_lines, line_ending};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    old_len: usize,
    lines: Vec<HunkLine>,
    old_missing_newline: bool,
    new_missing_newline: bool,
}

/// A parsed single-file unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub path: String,
    hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn hunk_count(&self) -> usize {
        self.hunks.len()
    }

    /// Apply the patch to `original`, returning the new text.
    pub fn apply_to(&self, original: &str) -> Result<String, ApplyError> {
        let lines: Vec<&str> = original.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut cursor = 0usize;
        let mut ends_without_newline = !original.is_empty() && !original.ends_with('\n');

        for (idx, hunk) in self.hunks.iter().enumerate() {
            let hunk_no = idx + 1;
            // A zero-length old range names the line *after which* to insert.
            let start = if hunk.old_len == 0 {
                hunk.old_start
            } else {
                hunk.old_start.saturating_sub(1)
            };
            if start < cursor || start > lines.len() {
                return Err(self.mismatch(hunk_no, start + 1));
            }
            out.extend(lines[cursor..start].iter().map(|l| (*l).to_string()));
            cursor = start;

            for line in &hunk.lines {
                match line {
                    HunkLine::Context(text) | HunkLine::Remove(text) => {
                        match lines.get(cursor) {
                            Some(found) if found == text => {}
                            _ => return Err(self.mismatch(hunk_no, cursor + 1)),
                        }
                        if let HunkLine::Context(text) = line {
                            out.push(text.clone());
                        }
                        cursor += 1;
                    }
                    HunkLine::Add(text) => out.push(text.clone()),
                }
            }

            if cursor == lines.len() {
                if hunk.old_missing_newline != ends_without_newline {
                    return Err(self.mismatch(hunk_no, cursor));
                }
                ends_without_newline = hunk.new_missing_newline;
            }
        }
        out.extend(lines[cursor..].iter().map(|l| (*l).to_string()));

        Ok(join_lines(&out, line_ending(original), !ends_without_newline))
    }

    fn mismatch(&self, hunk: usize, line: usize) -> ApplyError {
        ApplyError::HunkMismatch {
            path: self.path.clone(),
            hunk,
            line,
        }
    }
}

/// Parse a unified diff that touches exactly one file.
pub fn parse(diff: &str) -> Result<FilePatch, ApplyError> {
    let lines: Vec<&str> = diff.lines().collect();
    let mut pos = 0usize;

    while pos < lines.len() && !lines[pos].starts_with("--- ") {
        pos += 1;
    }
    let old_label = lines
        .get(pos)
        .and_then(|l| l.strip_prefix("--- "))
        .ok_or_else(|| malformed(pos, "missing '---' header"))?;
    pos += 1;
    let new_label = lines
        .get(pos)
        .and_then(|l| l.strip_prefix("+++ "))
        .ok_or_else(|| malformed(pos, "missing '+++' header"))?;
    pos += 1;

    let path = label_path(new_label).or_else(|| label_path(old_label));
    let path = path.ok_or_else(|| malformed(pos, "patch does not name a file"))?;

    let mut hunks = Vec::new();
    while pos < lines.len() {
        let header = lines[pos];
        if header.starts_with("--- ") {
            return Err(malformed(pos + 1, "patch touches more than one file"));
        }
        let caps = HUNK_HEADER
            .captures(header)
            .ok_or_else(|| malformed(pos + 1, "expected hunk header"))?;
        let number = |i: usize| -> Result<usize, ApplyError> {
            match caps.get(i) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| malformed(pos + 1, "bad hunk range")),
                None => Ok(1),
            }
        };
        let old_start = number(1)?;
        let old_len = number(2)?;
        let new_len = number(4)?;
        pos += 1;

        let mut hunk = Hunk {
            old_start,
            old_len,
            lines: Vec::new(),
            old_missing_newline: false,
            new_missing_newline: false,
        };
        let (mut old_seen, mut new_seen) = (0usize, 0usize);
        while pos < lines.len() && (old_seen < old_len || new_seen < new_len) {
            let line = lines[pos];
            let (tag, text) = match line.char_indices().nth(1) {
                Some((i, _)) => (&line[..i], &line[i..]),
                None => (line, ""),
            };
            match tag {
                " " | "" => {
                    hunk.lines.push(HunkLine::Context(text.to_string()));
                    old_seen += 1;
                    new_seen += 1;
                }
                "-" => {
                    hunk.lines.push(HunkLine::Remove(text.to_string()));
                    old_seen += 1;
                }
                "+" => {
                    hunk.lines.push(HunkLine::Add(text.to_string()));
                    new_seen += 1;
                }
                "\\" => mark_missing_newline(&mut hunk),
                _ => return Err(malformed(pos + 1, "unexpected line inside hunk")),
            }
            pos += 1;
        }
        if old_seen != old_len || new_seen != new_len {
            return Err(malformed(pos, "hunk is shorter than its header"));
        }
        if lines.get(pos).is_some_and(|l| l.starts_with('\\')) {
            mark_missing_newline(&mut hunk);
            pos += 1;
        }
        hunks.push(hunk);
    }

    if hunks.is_empty() {
        return Err(malformed(pos, "patch has no hunks"));
    }
    Ok(FilePatch { path, hunks })
}

/// Parse `diff` and apply it to `original` without touching disk.
pub fn dry_run(diff: &str, original: &str) -> Result<String, ApplyError> {
    parse(diff)?.apply_to(original)
}

fn mark_missing_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Remove(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        None => {}
    }
}

fn label_path(label: &str) -> Option<String> {
    let label = label.split('\t').next().unwrap_or(label).trim();
    if label.is_empty() || label == "/dev/null" {
        None
    } else {
        Some(label.to_string())
    }
}

fn malformed(line: usize, reason: &str) -> ApplyError {
    ApplyError::Malformed {
        line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch::{build_patch, unified_diff};
    use crate::core::types::{Edit, EditFrom, EditTo};

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
    fn applying_the_built_diff_reproduces_the_edit() {
        let original: String = (1..=30).map(|n| format!("    stmt_{n};\n")).collect();
        let edits = [
            edit(3, "stmt_3;", "    changed_3;"),
            edit(15, "stmt_15;\nstmt_16;", "    merged;"),
            edit(30, "", "    appended;"),
        ];
        let plan = build_patch("src/a.c", &original, &edits, 3).expect("valid");
        let applied = dry_run(&plan.diff, &original).expect("applies");
        assert_eq!(applied, plan.modified);
    }

    #[test]
    fn handles_files_without_trailing_newline() {
        let original = "one\ntwo";
        let modified = "one\n2";
        let diff = unified_diff("f", original, modified, 3);
        assert!(diff.contains("\\ No newline at end of file"));
        assert_eq!(dry_run(&diff, original).expect("applies"), modified);

        let modified = "one\ntwo\nthree\n";
        let diff = unified_diff("f", original, modified, 3);
        assert_eq!(dry_run(&diff, original).expect("applies"), modified);
    }

    #[test]
    fn drifted_source_is_a_hunk_mismatch() {
        let diff = unified_diff("f", "a\nb\nc\n", "a\nB\nc\n", 3);
        let err = dry_run(&diff, "a\nx\nc\n").expect_err("drifted");
        assert!(matches!(err, ApplyError::HunkMismatch { hunk: 1, .. }));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = dry_run("not a patch", "a\n").expect_err("malformed");
        assert!(matches!(err, ApplyError::Malformed { .. }));

        let err = dry_run("--- f\n+++ f\n@@ -1,2 +1,2 @@\n a\n", "a\nb\n").expect_err("short");
        assert!(matches!(err, ApplyError::Malformed { .. }));
    }

    #[test]
    fn parse_reads_path_and_hunks() {
        let diff = unified_diff("src/main.c", "a\nb\n", "a\nc\n", 3);
        let patch = parse(&diff).expect("parse");
        assert_eq!(patch.path, "src/main.c");
        assert_eq!(patch.hunk_count(), 1);
    }
}
