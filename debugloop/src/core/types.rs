//! Shared deterministic types for the debug loop.
//!
//! These types define stable contracts between the aggregator, dispatcher and
//! session log. They carry no I/O and serialize in the chat-completions message
//! shape so a recorded log can be sent back to the decision service unchanged.

use serde::{Deserialize, Serialize};

/// Output text used whenever an action produced nothing printable.
pub const NO_OUTPUT: &str = "The command produced no output.";

/// Author of a turn in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// True for turns produced by the decision service.
    pub fn is_decision(self) -> bool {
        self == Role::Assistant
    }
}

/// Function name and raw JSON argument text of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One requested action inside an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One entry in the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Line-anchored source location an edit replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFrom {
    pub start_line: usize,
    pub expected_text: String,
}

/// Replacement text for an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTo {
    pub start_line: usize,
    pub replacement_text: String,
}

/// One line-anchored edit. Line numbers refer to the file before any edit of
/// the same batch is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub from: EditFrom,
    pub to: EditTo,
}

/// Decoded action requested by the decision service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    RunDebuggerCommand {
        cmd: String,
    },
    GetSource {
        file: String,
        line: usize,
        context_lines: Option<usize>,
    },
    ModifyCode {
        file: String,
        edits: Vec<Edit>,
    },
    Recompile,
    Restart,
    GiveUp,
    Malformed {
        reason: String,
    },
    None,
}

impl IntentKind {
    /// Stable label used in turn metadata.
    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::RunDebuggerCommand { .. } => "run_debugger_command",
            IntentKind::GetSource { .. } => "get_source",
            IntentKind::ModifyCode { .. } => "modify_code",
            IntentKind::Recompile => "recompile",
            IntentKind::Restart => "restart",
            IntentKind::GiveUp => "give_up",
            IntentKind::Malformed { .. } => "malformed",
            IntentKind::None => "none",
        }
    }
}

/// An intent plus the call id its result is logged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub call_id: Option<String>,
    pub kind: IntentKind,
}

/// Ordered intents decoded from one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub intents: Vec<Intent>,
}

/// Uniform result of running an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub output: String,
}

impl ActionResult {
    /// Build a result, replacing blank output with [`NO_OUTPUT`].
    pub fn new(success: bool, output: impl Into<String>) -> Self {
        let output = output.into();
        let output = if output.trim().is_empty() {
            NO_OUTPUT.to_string()
        } else {
            output
        };
        Self { success, output }
    }

    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(true, output)
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self::new(false, output)
    }
}

/// Restorable working-tree snapshot (a git commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub commit: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_output_is_normalized() {
        assert_eq!(ActionResult::ok("").output, NO_OUTPUT);
        assert_eq!(ActionResult::failed("  \n").output, NO_OUTPUT);
        assert_eq!(ActionResult::ok("bt").output, "bt");
    }

    #[test]
    fn tool_turn_serializes_in_message_shape() {
        let turn = Turn::tool("call_1", "frame #0");
        let json = serde_json::to_value(&turn).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"role": "tool", "content": "frame #0", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn assistant_turn_round_trips_tool_calls() {
        let turn = Turn::assistant(None, vec![ToolCall::new("c1", "restart", "{}")]);
        let json = serde_json::to_string(&turn).expect("serialize");
        assert!(json.contains("\"type\":\"function\""));
        let back: Turn = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, turn);
    }
}
