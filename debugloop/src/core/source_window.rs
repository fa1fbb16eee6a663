//! Numbered source windows for `get_source`.

/// Render lines `[line - context, line + context]` of `text`, clipped to the
/// file, each prefixed with its 1-based number.
///
/// Returns `None` when `line` is outside `[1, total_lines]`.
pub fn numbered_window(text: &str, line: usize, context: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if line == 0 || line > lines.len() {
        return None;
    }
    let first = line.saturating_sub(context).max(1);
    let last = line.saturating_add(context).min(lines.len());
    let width = last.to_string().len();

    let mut out = String::new();
    for (idx, text) in lines.iter().enumerate().take(last).skip(first - 1) {
        out.push_str(&format!("{:>width$}: {text}\n", idx + 1));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "a\nb\nc\nd\ne\n";

    #[test]
    fn window_is_centered_and_numbered() {
        assert_eq!(numbered_window(TEXT, 3, 1).as_deref(), Some("2: b\n3: c\n4: d\n"));
    }

    #[test]
    fn window_is_clipped_to_the_file() {
        assert_eq!(numbered_window(TEXT, 1, 2).as_deref(), Some("1: a\n2: b\n3: c\n"));
        assert_eq!(numbered_window(TEXT, 5, 10).as_deref(), Some("1: a\n2: b\n3: c\n4: d\n5: e\n"));
    }

    #[test]
    fn out_of_range_lines_have_no_window() {
        assert_eq!(numbered_window(TEXT, 0, 3), None);
        assert_eq!(numbered_window(TEXT, 6, 3), None);
        assert_eq!(numbered_window("", 1, 3), None);
    }

    #[test]
    fn numbers_are_right_aligned() {
        let text: String = (1..=12).map(|n| format!("l{n}\n")).collect();
        let window = numbered_window(&text, 9, 1).expect("window");
        assert_eq!(window, " 8: l8\n 9: l9\n10: l10\n");
    }
}
