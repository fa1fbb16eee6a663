//! Debugger command usage across `run_debugger_command` calls.

use std::collections::BTreeMap;

use serde_json::Value;

use debugloop::core::types::{Role, Turn};

/// Commands whose second word is an argument, not a subcommand.
const NO_SUBCOMMANDS: &[&str] = &["p", "print", "expr", "expression", "x/s", "disassemble"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandCounts {
    /// First word of each command.
    pub commands: BTreeMap<String, usize>,
    /// First two words, for commands that take subcommands.
    pub subcommands: BTreeMap<String, usize>,
}

impl CommandCounts {
    /// Add every debugger command requested in `turns`.
    pub fn add_turns(&mut self, turns: &[Turn]) {
        let requested = turns
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .flat_map(|turn| &turn.tool_calls)
            .filter(|call| call.function.name == "run_debugger_command")
            .filter_map(|call| command_text(&call.function.arguments));
        for cmd in requested {
            self.add_command(&cmd);
        }
    }

    pub fn add_command(&mut self, cmd: &str) {
        let words: Vec<&str> = cmd.split_whitespace().collect();
        let Some(first) = words.first() else {
            return;
        };
        *self.commands.entry((*first).to_string()).or_insert(0) += 1;
        if NO_SUBCOMMANDS.contains(first) || words.len() < 2 {
            return;
        }
        *self.subcommands.entry(words[..2].join(" ")).or_insert(0) += 1;
    }
}

fn command_text(arguments: &str) -> Option<String> {
    let args: Value = serde_json::from_str(arguments).ok()?;
    args.get("cmd")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugloop::core::types::ToolCall;

    #[test]
    fn counts_commands_and_subcommands() {
        let mut counts = CommandCounts::default();
        for cmd in ["bt", "info locals", "info frame", "print x", "x/s buf", "frame 1", "  "] {
            counts.add_command(cmd);
        }
        assert_eq!(counts.commands["info"], 2);
        assert_eq!(counts.commands["print"], 1);
        assert_eq!(counts.commands.len(), 5);
        assert_eq!(counts.subcommands["info locals"], 1);
        assert_eq!(counts.subcommands["frame 1"], 1);
        assert!(!counts.subcommands.contains_key("print x"));
        assert!(!counts.subcommands.contains_key("x/s buf"));
    }

    #[test]
    fn reads_only_debugger_calls() {
        let turns = vec![
            Turn::assistant(
                None,
                vec![
                    ToolCall::new("c1", "run_debugger_command", r#"{"cmd":"bt full"}"#),
                    ToolCall::new("c2", "get_source", r#"{"file":"a.c","line_number":1}"#),
                    ToolCall::new("c3", "run_debugger_command", "not json"),
                ],
            ),
            Turn::user("run_debugger_command"),
        ];
        let mut counts = CommandCounts::default();
        counts.add_turns(&turns);
        assert_eq!(counts.commands.len(), 1);
        assert_eq!(counts.subcommands["bt full"], 1);
    }
}
