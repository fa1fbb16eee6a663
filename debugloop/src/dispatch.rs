//! One handler per intent.
//!
//! [`dispatch`] runs a decoded intent against the debugger, the source tree
//! and the build, and records its result in the session log. Action failures
//! become failed [`ActionResult`]s the decision service can react to; only
//! infrastructure failures (git, log persistence) are returned as errors.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::apply_engine::apply_patch;
use crate::core::error::{BuildError, SessionError};
use crate::core::source_window::numbered_window;
use crate::core::types::{ActionResult, Edit, Intent, IntentKind, Turn};
use crate::io::build::{BuildRequest, BuildRunner};
use crate::io::config::DriverConfig;
use crate::io::debugger::{DebuggerSession, SessionReply};
use crate::io::git::Git;
use crate::io::init::DriverPaths;
use crate::io::outcome::write_marker;
use crate::io::prompt::MALFORMED_NOTICE;
use crate::io::session_log::SessionLog;
use crate::io::workspace::{read_source, validate_and_diff};

/// Prefix for debugger commands that did not succeed.
pub const COMMAND_FAILED: &str = "Command execution failed: ";

/// What a handler may touch.
pub struct ActionContext<'a, D: DebuggerSession, B: BuildRunner> {
    pub config: &'a DriverConfig,
    pub paths: &'a DriverPaths,
    pub git: &'a Git,
    pub builder: &'a B,
    pub debugger: &'a mut D,
}

impl<D: DebuggerSession, B: BuildRunner> ActionContext<'_, D, B> {
    pub fn workdir(&self) -> &Path {
        &self.paths.root
    }

    pub fn build_request(&self) -> BuildRequest {
        BuildRequest {
            workdir: self.paths.root.clone(),
            command: self.config.build.command.clone(),
            timeout: Duration::from_secs(self.config.build.timeout_secs),
            output_limit_bytes: self.config.build.output_limit_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub result: ActionResult,
    /// Set when the intent ended the run; carries the final snapshot id.
    pub gave_up: Option<String>,
}

/// Run `intent` and append its result to `log`.
#[instrument(skip_all, fields(kind = intent.kind.label(), call_id = ?intent.call_id))]
pub fn dispatch<D: DebuggerSession, B: BuildRunner>(
    intent: &Intent,
    ctx: &mut ActionContext<'_, D, B>,
    log: &mut SessionLog,
) -> Result<DispatchOutcome> {
    let result = match &intent.kind {
        IntentKind::RunDebuggerCommand { cmd } => run_debugger_command(ctx, cmd)?,
        IntentKind::GetSource {
            file,
            line,
            context_lines,
        } => get_source(ctx, file, *line, *context_lines),
        IntentKind::ModifyCode { file, edits } => modify_code(ctx, file, edits)?,
        IntentKind::Recompile => recompile(ctx)?,
        IntentKind::Restart => session_reply(ctx.debugger.restart(), "Restart failed: ")?,
        IntentKind::GiveUp => give_up(ctx, log)?,
        IntentKind::Malformed { reason } => {
            ActionResult::failed(format!("{MALFORMED_NOTICE}\n{reason}"))
        }
        IntentKind::None => ActionResult::failed(MALFORMED_NOTICE),
    };
    debug!(success = result.success, bytes = result.output.len(), "intent dispatched");

    log.append(match &intent.call_id {
        Some(call_id) => Turn::tool(call_id.clone(), result.output.clone()),
        None => Turn::user(result.output.clone()),
    });

    let gave_up = match intent.kind {
        IntentKind::GiveUp => Some(log.persist(ctx.paths).context("persist final log")?),
        _ => None,
    };
    Ok(DispatchOutcome { result, gave_up })
}

fn run_debugger_command<D: DebuggerSession, B: BuildRunner>(
    ctx: &mut ActionContext<'_, D, B>,
    cmd: &str,
) -> Result<ActionResult> {
    session_reply(ctx.debugger.execute_command(cmd), COMMAND_FAILED)
}

/// Passthrough of a debugger reply; session errors become failed results.
fn session_reply(reply: Result<SessionReply>, failure_prefix: &str) -> Result<ActionResult> {
    match reply {
        Ok(reply) if reply.success => Ok(ActionResult::ok(reply.output)),
        Ok(reply) => Ok(ActionResult::failed(format!(
            "{failure_prefix}{}",
            reply.output
        ))),
        Err(err) => match err.downcast_ref::<SessionError>() {
            Some(session_err) => Ok(ActionResult::failed(format!(
                "{failure_prefix}{session_err}"
            ))),
            None => Err(err),
        },
    }
}

fn get_source<D: DebuggerSession, B: BuildRunner>(
    ctx: &ActionContext<'_, D, B>,
    file: &str,
    line: usize,
    context_lines: Option<usize>,
) -> ActionResult {
    let context = context_lines.unwrap_or(ctx.config.source.context_lines);
    let (path, text) = match read_source(ctx.workdir(), file) {
        Ok(found) => found,
        Err(err) => return ActionResult::failed(format!("Could not read source file: {err}")),
    };
    match numbered_window(&text, line, context) {
        Some(window) => ActionResult::ok(window),
        None => ActionResult::failed(format!(
            "Line {line} is out of range: {} has {} lines.",
            path.rel,
            text.lines().count()
        )),
    }
}

fn modify_code<D: DebuggerSession, B: BuildRunner>(
    ctx: &mut ActionContext<'_, D, B>,
    file: &str,
    edits: &[Edit],
) -> Result<ActionResult> {
    let context = ctx.config.patch.context_lines;
    match validate_and_diff(ctx.workdir(), file, edits, context) {
        Ok(plan) => Ok(apply_patch(ctx, &plan)?.result),
        Err(err) => {
            let request = serde_json::to_string_pretty(&json!({"file": file, "edits": edits}))
                .context("serialize patch request")?;
            Ok(ActionResult::failed(format!(
                "Patch validation failed: {err}\nRequested patch:\n{request}"
            )))
        }
    }
}

fn recompile<D: DebuggerSession, B: BuildRunner>(
    ctx: &ActionContext<'_, D, B>,
) -> Result<ActionResult> {
    match ctx.builder.run(&ctx.build_request()) {
        Ok(out) => Ok(ActionResult::new(out.success(), out.render())),
        Err(err) => match err.downcast_ref::<BuildError>() {
            Some(build_err) => Ok(ActionResult::failed(build_err.to_string())),
            None => Err(err.context("run build")),
        },
    }
}

fn give_up<D: DebuggerSession, B: BuildRunner>(
    ctx: &ActionContext<'_, D, B>,
    log: &SessionLog,
) -> Result<ActionResult> {
    info!(run_id = log.run_id(), "decision service gave up");
    write_marker(&ctx.paths.run(log.run_id()), false, "gave up")?;
    ctx.git
        .checkpoint(&format!("debugloop: {} gave up", log.run_id()), true)?;
    Ok(ActionResult::ok("Giving up. The run is marked as failed."))
}
