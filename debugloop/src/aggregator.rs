//! Fragment aggregation and decision replay.
//!
//! A live decision arrives as streamed fragments which are merged with
//! [`merge`](crate::core::merge) and turned into one assistant [`Turn`]. A
//! resumed run first drains the assistant turns of its recorded log, then
//! falls back to the live service.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::merge::{index_of, merge_all};
use crate::core::types::{ToolCall, Turn};
use crate::io::service::{DecisionRequest, DecisionService};

/// One decision plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedDecision {
    pub turn: Turn,
    /// Raw fragments of a live decision, in arrival order.
    pub fragments: Vec<Value>,
    pub replayed: bool,
}

/// Consume a fragment stream to completion and build the assistant turn.
pub fn aggregate<I>(fragments: I) -> Result<(Turn, Vec<Value>)>
where
    I: IntoIterator<Item = Result<Value>>,
{
    let mut received = Vec::new();
    for fragment in fragments {
        received.push(fragment.context("receive decision fragment")?);
    }
    let merged = merge_all(&received);
    Ok((turn_from_merged(&merged), received))
}

/// Convert a merged message object into an assistant turn.
///
/// Tool calls are ordered by `index`. Missing ids are synthesized from the
/// index; missing names and arguments are left empty for the decoder to reject.
pub fn turn_from_merged(merged: &Value) -> Turn {
    let content = merged
        .get("content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let mut calls: Vec<(u64, &Value)> = merged
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(pos, call)| (index_of(call).unwrap_or(pos as u64), call))
                .collect()
        })
        .unwrap_or_default();
    calls.sort_by_key(|(index, _)| *index);

    let tool_calls = calls
        .into_iter()
        .map(|(index, call)| {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map_or_else(|| format!("call_{index}"), str::to_string);
            let function = call.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = match function.and_then(|f| f.get("arguments")) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            ToolCall::new(id, name, arguments)
        })
        .collect::<Vec<_>>();

    // An assistant message needs content or tool calls to be sent back.
    let content = match content {
        None if tool_calls.is_empty() => Some(String::new()),
        other => other,
    };
    Turn::assistant(content, tool_calls)
}

/// Where decisions come from: a recorded queue first, then the live service.
pub struct DecisionSource<'s, S: DecisionService> {
    service: &'s S,
    replay: VecDeque<Turn>,
}

impl<'s, S: DecisionService> DecisionSource<'s, S> {
    pub fn live(service: &'s S) -> Self {
        Self {
            service,
            replay: VecDeque::new(),
        }
    }

    /// Replay the assistant turns of `recorded` before querying `service`.
    pub fn resuming(service: &'s S, recorded: Vec<Turn>) -> Self {
        Self {
            service,
            replay: recorded.into(),
        }
    }

    /// Recorded turns not yet consumed.
    pub fn pending_replay(&self) -> usize {
        self.replay.len()
    }

    #[instrument(skip_all, fields(pending = self.replay.len()))]
    pub fn next_decision(&mut self, request: &DecisionRequest<'_>) -> Result<SourcedDecision> {
        while let Some(turn) = self.replay.pop_front() {
            if turn.role.is_decision() {
                debug!(calls = turn.tool_calls.len(), "replaying recorded decision");
                return Ok(SourcedDecision {
                    turn,
                    fragments: Vec::new(),
                    replayed: true,
                });
            }
        }

        let stream = self.service.fragments(request)?;
        let (turn, fragments) = aggregate(stream)?;
        debug!(
            fragments = fragments.len(),
            calls = turn.tool_calls.len(),
            "decision aggregated"
        );
        Ok(SourcedDecision {
            turn,
            fragments,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::test_support::ScriptedService;
    use serde_json::json;

    fn request<'a>(turns: &'a [Turn], tools: &'a Value) -> DecisionRequest<'a> {
        DecisionRequest { turns, tools }
    }

    #[test]
    fn streamed_tool_calls_are_ordered_by_index() {
        let fragments = vec![
            json!({"role": "assistant", "content": null, "tool_calls": [
                {"index": 1, "id": "call_b", "type": "function",
                 "function": {"name": "restart", "arguments": ""}}]}),
            json!({"tool_calls": [{"index": 0, "id": "call_a", "type": "function",
                 "function": {"name": "run_debugger_command", "arguments": "{\"cmd\""}}]}),
            json!({"tool_calls": [{"index": 0, "function": {"arguments": ":\"bt\"}"}}]}),
            json!({"tool_calls": [{"index": 1, "function": {"arguments": "{}"}}]}),
        ];
        let (turn, received) = aggregate(fragments.into_iter().map(Ok)).expect("aggregate");

        assert_eq!(received.len(), 4);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, None);
        assert_eq!(
            turn.tool_calls,
            vec![
                ToolCall::new("call_a", "run_debugger_command", r#"{"cmd":"bt"}"#),
                ToolCall::new("call_b", "restart", "{}"),
            ]
        );
    }

    #[test]
    fn text_streams_concatenate() {
        let fragments = vec![json!({"role": "assistant", "content": "Let me "}), json!({"content": "think."})];
        let (turn, _) = aggregate(fragments.into_iter().map(Ok)).expect("aggregate");
        assert_eq!(turn.content.as_deref(), Some("Let me think."));
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn calls_without_id_or_name_survive_for_the_decoder() {
        let merged = json!({"tool_calls": [{"index": 2, "function": {"arguments": "{}"}}]});
        let turn = turn_from_merged(&merged);
        assert_eq!(turn.tool_calls, vec![ToolCall::new("call_2", "", "{}")]);
    }

    #[test]
    fn empty_decision_keeps_an_empty_content_field() {
        let turn = turn_from_merged(&json!({"role": "assistant", "content": null}));
        assert_eq!(turn.content.as_deref(), Some(""));
        assert!(turn.tool_calls.is_empty());
        let encoded = serde_json::to_value(&turn).expect("serialize");
        assert_eq!(encoded, json!({"role": "assistant", "content": ""}));
    }

    #[test]
    fn stream_errors_propagate() {
        let fragments = vec![Ok(json!({"content": "a"})), Err(anyhow::anyhow!("connection reset"))];
        let err = aggregate(fragments).expect_err("error");
        assert!(format!("{err:#}").contains("connection reset"));
    }

    #[test]
    fn replay_returns_recorded_assistant_turns_then_goes_live() {
        let service = ScriptedService::new(vec![vec![json!({"role": "assistant", "content": "live"})]]);
        let recorded = vec![
            Turn::system("sys"),
            Turn::user("stopped"),
            Turn::assistant(None, vec![ToolCall::new("c1", "restart", "{}")]),
            Turn::tool("c1", "restarted"),
        ];
        let mut source = DecisionSource::resuming(&service, recorded);
        let tools = json!([]);

        let first = source.next_decision(&request(&[], &tools)).expect("replayed");
        assert!(first.replayed);
        assert_eq!(first.turn.tool_calls[0].id, "c1");
        assert_eq!(source.pending_replay(), 1);
        assert_eq!(service.calls(), 0);

        let second = source.next_decision(&request(&[], &tools)).expect("live");
        assert!(!second.replayed);
        assert_eq!(second.turn.content.as_deref(), Some("live"));
        assert_eq!(source.pending_replay(), 0);
        assert_eq!(service.calls(), 1);
    }
}
