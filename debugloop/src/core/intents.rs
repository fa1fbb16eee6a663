//! The fixed action menu and decoding of assistant turns into intents.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde::Deserialize;
use serde_json::Value;

use super::types::{Decision, Edit, Intent, IntentKind, ToolCall, Turn};

const TOOLS_V1: &str = include_str!("../../schemas/tools.v1.json");

#[derive(Debug, Deserialize)]
struct RunDebuggerCommandArgs {
    cmd: String,
}

#[derive(Debug, Deserialize)]
struct GetSourceArgs {
    file: String,
    line_number: usize,
    #[serde(default)]
    context_lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModifyCodeArgs {
    file: String,
    edits: Vec<Edit>,
}

/// Function tools offered to the decision service, with compiled argument schemas.
pub struct ToolMenu {
    tools: Value,
    validators: BTreeMap<String, Validator>,
}

impl std::fmt::Debug for ToolMenu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolMenu")
            .field("names", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolMenu {
    /// Load the built-in menu.
    pub fn load() -> Result<Self> {
        let tools: Value = serde_json::from_str(TOOLS_V1).context("parse tool menu")?;
        Self::from_value(tools)
    }

    fn from_value(tools: Value) -> Result<Self> {
        let entries = tools
            .as_array()
            .ok_or_else(|| anyhow!("tool menu must be a JSON array"))?;
        let mut validators = BTreeMap::new();
        for entry in entries {
            let function = &entry["function"];
            let name = function["name"]
                .as_str()
                .ok_or_else(|| anyhow!("tool menu entry without a name"))?;
            let validator = jsonschema::validator_for(&function["parameters"])
                .with_context(|| format!("compile argument schema for {name}"))?;
            validators.insert(name.to_string(), validator);
        }
        Ok(Self { tools, validators })
    }

    /// The menu in chat-completions `tools` form.
    pub fn tools(&self) -> &Value {
        &self.tools
    }

    /// Decode an assistant turn into its ordered intents.
    ///
    /// A turn without tool calls decodes to a single `None` intent.
    pub fn decode(&self, turn: &Turn) -> Decision {
        if turn.tool_calls.is_empty() {
            return Decision {
                intents: vec![Intent {
                    call_id: None,
                    kind: IntentKind::None,
                }],
            };
        }
        let intents = turn
            .tool_calls
            .iter()
            .map(|call| Intent {
                call_id: Some(call.id.clone()),
                kind: self
                    .decode_call(call)
                    .unwrap_or_else(|reason| IntentKind::Malformed { reason }),
            })
            .collect();
        Decision { intents }
    }

    fn decode_call(&self, call: &ToolCall) -> Result<IntentKind, String> {
        let name = call.function.name.trim();
        if name.is_empty() {
            return Err("tool call has no function name".to_string());
        }
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| format!("unknown function `{name}`"))?;

        let raw = call.function.arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|err| format!("arguments for `{name}` are not valid JSON: {err}"))?
        };

        let problems: Vec<String> = validator.iter_errors(&args).map(|e| e.to_string()).collect();
        if !problems.is_empty() {
            return Err(format!(
                "arguments for `{name}` do not match its schema: {}",
                problems.join("; ")
            ));
        }

        let typed = |err: serde_json::Error| format!("arguments for `{name}`: {err}");
        let kind = match name {
            "run_debugger_command" => {
                let args: RunDebuggerCommandArgs = serde_json::from_value(args).map_err(typed)?;
                IntentKind::RunDebuggerCommand { cmd: args.cmd }
            }
            "get_source" => {
                let args: GetSourceArgs = serde_json::from_value(args).map_err(typed)?;
                IntentKind::GetSource {
                    file: args.file,
                    line: args.line_number,
                    context_lines: args.context_lines,
                }
            }
            "modify_code" => {
                let args: ModifyCodeArgs = serde_json::from_value(args).map_err(typed)?;
                IntentKind::ModifyCode {
                    file: args.file,
                    edits: args.edits,
                }
            }
            "recompile" => IntentKind::Recompile,
            "restart" => IntentKind::Restart,
            "give_up" => IntentKind::GiveUp,
            other => return Err(format!("unknown function `{other}`")),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> ToolMenu {
        ToolMenu::load().expect("menu")
    }

    fn one(turn: &Turn) -> IntentKind {
        let decision = menu().decode(turn);
        assert_eq!(decision.intents.len(), 1);
        decision.intents[0].kind.clone()
    }

    fn call(name: &str, args: &str) -> Turn {
        Turn::assistant(None, vec![ToolCall::new("call_1", name, args)])
    }

    #[test]
    fn menu_lists_the_six_actions() {
        let menu = menu();
        let mut names: Vec<&str> = menu
            .tools()
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["function"]["name"].as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["get_source", "give_up", "modify_code", "recompile", "restart", "run_debugger_command"]
        );
        assert_eq!(menu.tools().as_array().map(Vec::len), Some(6));
    }

    #[test]
    fn text_only_turn_is_none() {
        let decision = menu().decode(&Turn::assistant(Some("thinking".into()), vec![]));
        assert_eq!(
            decision.intents,
            vec![Intent {
                call_id: None,
                kind: IntentKind::None
            }]
        );
    }

    #[test]
    fn decodes_debugger_command() {
        assert_eq!(
            one(&call("run_debugger_command", r#"{"cmd":"bt"}"#)),
            IntentKind::RunDebuggerCommand { cmd: "bt".into() }
        );
    }

    #[test]
    fn decodes_get_source_with_optional_context() {
        assert_eq!(
            one(&call("get_source", r#"{"file":"main.c","line_number":12}"#)),
            IntentKind::GetSource {
                file: "main.c".into(),
                line: 12,
                context_lines: None
            }
        );
    }

    #[test]
    fn decodes_modify_code() {
        let args = r#"{"file":"main.c","edits":[{"from":{"start_line":10,"expected_text":"return 1;"},"to":{"start_line":10,"replacement_text":"return 0;"}}]}"#;
        match one(&call("modify_code", args)) {
            IntentKind::ModifyCode { file, edits } => {
                assert_eq!(file, "main.c");
                assert_eq!(edits.len(), 1);
                assert_eq!(edits[0].to.replacement_text, "return 0;");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_arguments_mean_empty_object() {
        assert_eq!(one(&call("restart", "")), IntentKind::Restart);
        assert_eq!(one(&call("give_up", "{}")), IntentKind::GiveUp);
    }

    #[test]
    fn bad_calls_are_malformed() {
        for (name, args) in [
            ("launch_missiles", "{}"),
            ("", "{}"),
            ("run_debugger_command", "{\"cmd\":"),
            ("run_debugger_command", "{}"),
            ("get_source", r#"{"file":"a.c","line_number":0}"#),
            ("modify_code", r#"{"file":"a.c","edits":[]}"#),
        ] {
            assert!(
                matches!(one(&call(name, args)), IntentKind::Malformed { .. }),
                "{name} {args} should be malformed"
            );
        }
    }

    #[test]
    fn call_ids_are_kept_in_order() {
        let turn = Turn::assistant(
            None,
            vec![
                ToolCall::new("a", "recompile", "{}"),
                ToolCall::new("b", "restart", "{}"),
            ],
        );
        let ids: Vec<Option<String>> = menu()
            .decode(&turn)
            .intents
            .into_iter()
            .map(|i| i.call_id)
            .collect();
        assert_eq!(ids, vec![Some("a".into()), Some("b".into())]);
    }
}
