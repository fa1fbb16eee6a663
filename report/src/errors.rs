//! Debugger error messages from failed `run_debugger_command` results.
//!
//! Each failure counts once under the first line of its message. Messages
//! that embed a symbol, address or frame number are folded together by
//! substring rules so that variants of one error share a key.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use debugloop::core::types::{Role, Turn};
use debugloop::dispatch::COMMAND_FAILED;

/// Substring rules for the errors gdb reports most often.
const DEFAULT_GROUPS: &[(&str, &str)] = &[
    ("No symbol", "No symbol in current context"),
    ("Cannot access memory at address", "Cannot access memory at address"),
    ("Undefined command", "Undefined command"),
    ("No frame at level", "No frame at level"),
    ("No frame selected", "No frame selected"),
    ("The program is not being run", "The program is not being run"),
    ("No source file named", "No source file named"),
    ("Invalid number", "Invalid number"),
    ("A syntax error in expression", "A syntax error in expression"),
];

/// Ordered `substring -> key` rules; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorGroups {
    rules: Vec<(String, String)>,
}

impl Default for ErrorGroups {
    fn default() -> Self {
        Self {
            rules: DEFAULT_GROUPS
                .iter()
                .map(|(needle, key)| ((*needle).to_string(), (*key).to_string()))
                .collect(),
        }
    }
}

impl ErrorGroups {
    /// Parse `substring=key` rules; they take precedence over existing ones.
    pub fn with_rules(mut self, specs: &[String]) -> Result<Self> {
        let mut added = Vec::with_capacity(specs.len());
        for spec in specs {
            let (needle, key) = spec
                .split_once('=')
                .ok_or_else(|| anyhow!("group rule '{spec}' is not of the form substring=key"))?;
            if needle.is_empty() {
                return Err(anyhow!("group rule '{spec}' has an empty substring"));
            }
            added.push((needle.to_string(), key.trim().to_string()));
        }
        added.append(&mut self.rules);
        self.rules = added;
        Ok(self)
    }

    fn key_for(&self, message: &str) -> String {
        self.rules
            .iter()
            .find(|(needle, _)| message.contains(needle.as_str()))
            .map_or_else(|| message.to_string(), |(_, key)| key.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    counts: BTreeMap<String, usize>,
}

impl ErrorCounts {
    /// Count every failed debugger command result in `turns`.
    pub fn add_turns(&mut self, turns: &[Turn], groups: &ErrorGroups) {
        let messages = turns
            .iter()
            .filter(|turn| turn.role == Role::Tool)
            .filter_map(|turn| turn.content.as_deref())
            .filter_map(error_message);
        for message in messages {
            *self.counts.entry(groups.key_for(message)).or_insert(0) += 1;
        }
    }

    /// Most frequent first; ties by message.
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(message, count)| (message.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// First line of a failed command result, without the failure prefix, a
/// leading `error: ` or the trailing period.
fn error_message(content: &str) -> Option<&str> {
    let first = content.lines().next()?.strip_prefix(COMMAND_FAILED)?;
    let first = first.strip_prefix("error: ").unwrap_or(first);
    let message = first.trim().trim_end_matches('.');
    (!message.is_empty()).then_some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(call: &str, text: &str) -> Turn {
        Turn::tool(call, format!("{COMMAND_FAILED}{text}"))
    }

    #[test]
    fn strips_prefix_and_trailing_period() {
        assert_eq!(
            error_message("Command execution failed: error: no variable named 'x'.\nmore"),
            Some("no variable named 'x'")
        );
        assert_eq!(error_message("Patch applied:\n..."), None);
        assert_eq!(error_message(COMMAND_FAILED), None);
    }

    #[test]
    fn groups_variants_and_sorts_by_count() {
        let turns = vec![
            failed("c1", "No symbol \"buf\" in current context."),
            failed("c2", "No symbol \"len\" in current context."),
            failed("c3", "Cannot access memory at address 0x0"),
            failed("c4", "Undefined command: \"foo\".  Try \"help\"."),
            failed("c5", "Undefined command: \"bar\".  Try \"help\"."),
            failed("c6", "Undefined command: \"baz\".  Try \"help\"."),
            Turn::user(format!("{COMMAND_FAILED}not a tool result")),
            Turn::tool("c7", "#0 main () at main.c:10"),
        ];
        let mut counts = ErrorCounts::default();
        counts.add_turns(&turns, &ErrorGroups::default());

        assert_eq!(
            counts.sorted(),
            vec![
                ("Undefined command", 3),
                ("No symbol in current context", 2),
                ("Cannot access memory at address", 1),
            ]
        );
    }

    #[test]
    fn custom_rules_win_and_ungrouped_messages_stand_alone() {
        let groups = ErrorGroups { rules: Vec::new() }
            .with_rules(&["current context=missing symbol".to_string()])
            .expect("rules");
        let turns = vec![
            failed("c1", "No symbol \"buf\" in current context."),
            failed("c2", "Cannot access memory at address 0x0"),
        ];
        let mut counts = ErrorCounts::default();
        counts.add_turns(&turns, &groups);

        assert_eq!(
            counts.sorted(),
            vec![("Cannot access memory at address 0x0", 1), ("missing symbol", 1)]
        );
        assert!(
            ErrorGroups::default()
                .with_rules(&["no separator".to_string()])
                .is_err()
        );
    }
}
