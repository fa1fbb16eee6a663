//! Per-turn records under `.debugloop/runs/<run-id>/turns/<n>/`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::atomic::{write_atomic, write_json};
use super::init::RunPaths;

/// Outcome of one dispatched intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentRecord {
    pub call_id: Option<String>,
    pub kind: String,
    pub success: bool,
    pub output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnMeta {
    pub run_id: String,
    pub turn: u32,
    /// True when the decision came from a resumed log rather than the service.
    pub replayed: bool,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
    pub snapshot_id: Option<String>,
    pub intents: Vec<IntentRecord>,
}

#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub stream_path: PathBuf,
}

impl TurnPaths {
    pub fn new(run: &RunPaths, turn: u32) -> Self {
        let dir = run.turn_dir(turn);
        Self {
            meta_path: dir.join("meta.json"),
            stream_path: dir.join("stream.jsonl"),
            dir,
        }
    }
}

pub struct TurnWriteRequest<'a> {
    pub run: &'a RunPaths,
    pub meta: &'a TurnMeta,
    /// Raw fragments of a live decision; empty for replayed turns.
    pub fragments: &'a [Value],
}

pub fn write_turn(request: &TurnWriteRequest<'_>) -> Result<TurnPaths> {
    let paths = TurnPaths::new(request.run, request.meta.turn);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    if !request.fragments.is_empty() {
        let mut buf = String::new();
        for fragment in request.fragments {
            buf.push_str(&serde_json::to_string(fragment).context("serialize fragment")?);
            buf.push('\n');
        }
        write_atomic(&paths.stream_path, &buf)?;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::init::DriverPaths;
    use serde_json::json;

    fn meta(turn: u32, replayed: bool) -> TurnMeta {
        TurnMeta {
            run_id: "run-9".to_string(),
            turn,
            replayed,
            started_at: None,
            ended_at: None,
            duration_ms: Some(12),
            snapshot_id: Some("run-9-turn-0001".to_string()),
            intents: vec![IntentRecord {
                call_id: Some("c1".to_string()),
                kind: "run_debugger_command".to_string(),
                success: true,
                output_bytes: 42,
            }],
        }
    }

    #[test]
    fn writes_meta_and_stream_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = DriverPaths::new(temp.path()).run("run-9");
        let fragments = vec![json!({"role": "assistant"}), json!({"content": "hi"})];

        let paths = write_turn(&TurnWriteRequest {
            run: &run,
            meta: &meta(1, false),
            fragments: &fragments,
        })
        .expect("write");

        assert!(paths.dir.ends_with("runs/run-9/turns/1"));
        let stream = fs::read_to_string(&paths.stream_path).expect("stream");
        assert_eq!(stream, "{\"role\":\"assistant\"}\n{\"content\":\"hi\"}\n");
        let meta: Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("meta")).expect("json");
        assert_eq!(meta["intents"][0]["kind"], "run_debugger_command");
        assert_eq!(meta["replayed"], false);
    }

    #[test]
    fn replayed_turns_have_no_stream_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = DriverPaths::new(temp.path()).run("run-9");
        let paths = write_turn(&TurnWriteRequest {
            run: &run,
            meta: &meta(2, true),
            fragments: &[],
        })
        .expect("write");
        assert!(paths.meta_path.is_file());
        assert!(!paths.stream_path.exists());
    }
}
