//! Test-only fakes for the decision service, debugger and build runner, plus
//! a throwaway git repository.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use crate::io::build::{BuildOutput, BuildRequest, BuildRunner};
use crate::io::debugger::{DebuggerSession, SessionReply};
use crate::io::git::Git;
use crate::io::service::{DecisionRequest, DecisionService, Fragments};

/// A C file whose line 10 reads `return 1;`.
pub const CRASHING_MAIN: &str = "\
#include <stdio.h>

static int check(int value) {
    return value > 1;
}

int main(void) {
    int value = 2;
    if (check(value)) {
        return 1;
    }
    printf(\"ok\\n\");
    return 0;
}
";

/// A tool-call fragment in streamed `delta` shape.
pub fn call_fragment(index: u64, id: &str, name: &str, args: &Value) -> Value {
    json!({
        "tool_calls": [{
            "index": index,
            "id": id,
            "type": "function",
            "function": {"name": name, "arguments": args.to_string()},
        }]
    })
}

/// A complete single-call decision as one fragment list.
pub fn single_call(id: &str, name: &str, args: Value) -> Vec<Value> {
    let mut first = call_fragment(0, id, name, &args);
    first["role"] = json!("assistant");
    vec![first]
}

/// Replays queued fragment lists, one list per decision request.
pub struct ScriptedService {
    decisions: RefCell<VecDeque<Vec<Value>>>,
    calls: Cell<usize>,
}

impl ScriptedService {
    pub fn new(decisions: Vec<Vec<Value>>) -> Self {
        Self {
            decisions: RefCell::new(decisions.into()),
            calls: Cell::new(0),
        }
    }

    /// Number of decision requests served.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl DecisionService for ScriptedService {
    fn fragments<'a>(&'a self, _request: &DecisionRequest<'_>) -> Result<Fragments<'a>> {
        self.calls.set(self.calls.get() + 1);
        let fragments = self
            .decisions
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted service has no decision left"))?;
        Ok(Box::new(fragments.into_iter().map(Ok::<Value, anyhow::Error>)))
    }
}

/// A debugger whose replies, restarts and exit are scripted.
#[derive(Debug, Default)]
pub struct FakeDebugger {
    stop: String,
    replies: VecDeque<SessionReply>,
    restart_exits: VecDeque<Option<i32>>,
    restart_failure: Option<String>,
    exit_code: Option<i32>,
    pub commands: Vec<String>,
    pub restarts: u32,
}

impl FakeDebugger {
    /// A process stopped with the given description.
    pub fn stopped(stop: &str) -> Self {
        Self {
            stop: stop.to_string(),
            ..Self::default()
        }
    }

    /// Replies returned by successive `execute_command` calls.
    pub fn with_replies(mut self, replies: Vec<SessionReply>) -> Self {
        self.replies = replies.into();
        self
    }

    /// Exit codes produced by successive restarts; `None` stops again.
    pub fn with_restart_exits(mut self, exits: Vec<Option<i32>>) -> Self {
        self.restart_exits = exits.into();
        self
    }

    /// Every restart fails with `output`.
    pub fn with_restart_failure(mut self, output: &str) -> Self {
        self.restart_failure = Some(output.to_string());
        self
    }
}

impl DebuggerSession for FakeDebugger {
    fn stop_info(&mut self) -> Result<String> {
        Ok(match self.exit_code {
            Some(code) => format!("Process exited with status {code}"),
            None => self.stop.clone(),
        })
    }

    fn execute_command(&mut self, cmd: &str) -> Result<SessionReply> {
        self.commands.push(cmd.to_string());
        Ok(self
            .replies
            .pop_front()
            .unwrap_or_else(|| SessionReply::ok(format!("ran {cmd}"))))
    }

    fn restart(&mut self) -> Result<SessionReply> {
        self.restarts += 1;
        if let Some(output) = &self.restart_failure {
            return Ok(SessionReply::failed(output.clone()));
        }
        self.exit_code = self.restart_exits.pop_front().flatten();
        let state = self.stop_info()?;
        Ok(SessionReply::ok(format!("Process restarted. New state: {state}")))
    }

    fn has_exited(&self) -> bool {
        self.exit_code.is_some()
    }

    fn exit_status_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Returns queued build outputs; succeeds silently once the queue is empty.
#[derive(Default)]
pub struct ScriptedBuildRunner {
    outputs: RefCell<VecDeque<BuildOutput>>,
    runs: Cell<usize>,
}

impl ScriptedBuildRunner {
    pub fn new(outputs: Vec<BuildOutput>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            runs: Cell::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl BuildRunner for ScriptedBuildRunner {
    fn run(&self, _request: &BuildRequest) -> Result<BuildOutput> {
        self.runs.set(self.runs.get() + 1);
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| build_ok("")))
    }
}

pub fn build_ok(stdout: &str) -> BuildOutput {
    BuildOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        timed_out: false,
    }
}

pub fn build_failed(stderr: &str) -> BuildOutput {
    BuildOutput {
        exit_code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
        timed_out: false,
    }
}

/// A git repository in a temp dir with a committed `main.c`.
pub struct TestRepo {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let root = temp.path().to_path_buf();
        let repo = Self { _temp: temp, root };
        let git = repo.git();
        git.init()?;
        repo.write("main.c", CRASHING_MAIN)?;
        git.checkpoint("initial source", false)?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// 1-based line of a file, without its terminator.
    pub fn line(&self, rel: &str, number: usize) -> Result<String> {
        self.read(rel)?
            .lines()
            .nth(number.saturating_sub(1))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{rel} has no line {number}"))
    }
}
