//! GDB/MI output records.
//!
//! Only what the session needs: record classification, `key="value"` fields
//! and C-string unescaping. Nested tuples are not modelled; a field lookup
//! returns the first occurrence, which for `*stopped` is the stop frame.

use std::sync::LazyLock;

use regex::Regex;

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)="((?:[^"\\]|\\.)*)""#).expect("valid MI field regex")
});

/// One line of MI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiRecord {
    /// `[token]^class[,body]`
    Result {
        token: Option<u64>,
        class: String,
        body: String,
    },
    /// `*class[,body]`
    Exec { class: String, body: String },
    /// `=class[,body]`
    Notify { class: String, body: String },
    /// `~"text"`
    Console(String),
    /// `@"text"` (output of the debugged program)
    Target(String),
    /// `&"text"` (debugger diagnostics)
    Log(String),
    /// `(gdb)`
    Prompt,
    /// Anything else, such as raw program output sharing the terminal.
    Other(String),
}

impl MiRecord {
    pub fn parse(line: &str) -> MiRecord {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim_end() == "(gdb)" {
            return MiRecord::Prompt;
        }

        let digits = line.bytes().take_while(u8::is_ascii_digit).count();
        let token = line[..digits].parse::<u64>().ok();
        let rest = &line[digits..];
        let Some(marker) = rest.chars().next() else {
            return MiRecord::Other(line.to_string());
        };
        let payload = &rest[marker.len_utf8()..];

        match marker {
            '^' => {
                let (class, body) = split_class(payload);
                MiRecord::Result { token, class, body }
            }
            '*' => {
                let (class, body) = split_class(payload);
                MiRecord::Exec { class, body }
            }
            '=' => {
                let (class, body) = split_class(payload);
                MiRecord::Notify { class, body }
            }
            '~' if digits == 0 => MiRecord::Console(unquote(payload)),
            '@' if digits == 0 => MiRecord::Target(unquote(payload)),
            '&' if digits == 0 => MiRecord::Log(unquote(payload)),
            _ => MiRecord::Other(line.to_string()),
        }
    }
}

fn split_class(payload: &str) -> (String, String) {
    match payload.split_once(',') {
        Some((class, body)) => (class.to_string(), body.to_string()),
        None => (payload.to_string(), String::new()),
    }
}

/// Value of the first `key="..."` in `body`, unescaped.
pub fn field(body: &str, key: &str) -> Option<String> {
    FIELD
        .captures_iter(body)
        .find(|caps| &caps[1] == key)
        .map(|caps| unescape(&caps[2]))
}

fn unquote(payload: &str) -> String {
    let inner = payload
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(payload);
    unescape(inner)
}

/// Undo C-string escaping as produced by gdb.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(d) if d.is_digit(8) => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            value = value * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('?'));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Quote `text` as a C string for an MI command argument.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
