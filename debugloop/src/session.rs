//! Run orchestration: preparing a working directory and driving the
//! decide/dispatch loop until the process exits, the service gives up, or the
//! turn limit is reached.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{info, instrument, warn};

use crate::aggregator::DecisionSource;
use crate::core::intents::ToolMenu;
use crate::core::types::{Checkpoint, Turn};
use crate::dispatch::{ActionContext, dispatch};
use crate::io::build::{BuildRequest, BuildRunner};
use crate::io::config::DriverConfig;
use crate::io::debugger::DebuggerSession;
use crate::io::git::Git;
use crate::io::init::{DriverPaths, RunPaths, ensure_layout};
use crate::io::outcome::write_marker;
use crate::io::prompt::{
    NEXT_INSTRUCTION, SystemPromptInputs, initial_user_message, render_system_prompt,
};
use crate::io::run_record::{RunRecord, load_run_record, write_run_record};
use crate::io::service::{DecisionRequest, DecisionService};
use crate::io::session_log::{SessionLog, Snapshot, load_snapshot};
use crate::io::turn_log::{IntentRecord, TurnMeta, TurnWriteRequest, write_turn};

/// A prepared working directory and the identity of the run about to start.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub run_id: String,
    pub paths: DriverPaths,
    pub config: DriverConfig,
    pub initial_checkpoint: Checkpoint,
}

/// The debugged program and an optional resume point.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub executable: String,
    pub args: Vec<String>,
    /// Recorded decisions replayed first; see [`restore_resume_point`].
    pub resume: Option<Snapshot>,
}

/// Reason why `run_session` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The debugged process exited with `code` (`-1` when killed by a signal).
    Exited { code: i32 },
    GaveUp,
    MaxTurnsExceeded { max_turns: u32 },
}

impl LoopStop {
    pub fn label(&self) -> &'static str {
        match self {
            LoopStop::Exited { .. } => "exited",
            LoopStop::GaveUp => "gave_up",
            LoopStop::MaxTurnsExceeded { .. } => "turn_limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub run_id: String,
    pub turns: u32,
    pub stop: LoopStop,
}

/// Prepare `workdir` for a run.
///
/// Creates `.debugloop/`, initializes git when needed, optionally builds, and
/// records the starting tree as the first checkpoint.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn start_session<B: BuildRunner>(
    workdir: &Path,
    config: DriverConfig,
    builder: &B,
) -> Result<SessionSetup> {
    config.validate()?;
    let paths = DriverPaths::new(workdir);
    ensure_layout(&paths)?;
    let git = Git::new(workdir);
    git.init().context("initialize git repository")?;

    if config.build.on_start {
        let out = builder
            .run(&BuildRequest {
                workdir: workdir.to_path_buf(),
                command: config.build.command.clone(),
                timeout: Duration::from_secs(config.build.timeout_secs),
                output_limit_bytes: config.build.output_limit_bytes,
            })
            .context("initial build")?;
        if !out.success() {
            bail!("initial build failed:\n{}", out.render());
        }
    }

    let run_id = generate_run_id();
    let initial_checkpoint = git.checkpoint(&format!("debugloop: start {run_id}"), true)?;
    write_run_record(
        &paths.run(&run_id),
        &RunRecord::started(&run_id, &initial_checkpoint.commit),
    )?;
    info!(run_id = %run_id, commit = %initial_checkpoint.commit, "session started");
    Ok(SessionSetup {
        run_id,
        paths,
        config,
        initial_checkpoint,
    })
}

/// Load a resume point and rewind the tree to the commit its run started
/// from, so recorded decisions replay against the source they were made for.
///
/// The rewound tree becomes this run's starting checkpoint. Call before the
/// debugger is launched so it runs the rewound program.
#[instrument(skip(setup), fields(run_id = %setup.run_id))]
pub fn restore_resume_point(setup: &mut SessionSetup, id: &str) -> Result<Snapshot> {
    let snapshot = load_snapshot(&setup.paths, id)?;
    let git = Git::new(&setup.paths.root);
    match &snapshot.start_commit {
        Some(commit) => {
            git.reset_to(commit)
                .with_context(|| format!("rewind to the start of {}", snapshot.run_id))?;
            setup.initial_checkpoint = git.checkpoint(
                &format!("debugloop: resume {} from {}", setup.run_id, snapshot.id),
                true,
            )?;
            write_run_record(
                &setup.paths.run(&setup.run_id),
                &RunRecord::started(&setup.run_id, &setup.initial_checkpoint.commit),
            )?;
        }
        None => warn!(
            snapshot = %snapshot.id,
            "no start commit recorded, replaying against the current tree"
        ),
    }
    info!(from = %snapshot.id, turns = snapshot.turns.len(), "resume point restored");
    Ok(snapshot)
}

/// Drive the loop until a terminal state.
///
/// Errors are infrastructure failures; every way the run can legitimately end
/// is a [`LoopStop`].
#[instrument(skip_all, fields(run_id = %setup.run_id))]
pub fn run_session<S, D, B, F>(
    setup: &SessionSetup,
    request: &RunRequest,
    service: &S,
    debugger: &mut D,
    builder: &B,
    mut on_turn: F,
) -> Result<SessionOutcome>
where
    S: DecisionService,
    D: DebuggerSession,
    B: BuildRunner,
    F: FnMut(&TurnMeta),
{
    let paths = &setup.paths;
    let config = &setup.config;
    let run = paths.run(&setup.run_id);
    let git = Git::new(&paths.root);
    let menu = ToolMenu::load()?;

    let mut source = match &request.resume {
        Some(snapshot) => DecisionSource::resuming(service, snapshot.turns.clone()),
        None => DecisionSource::live(service),
    };

    let mut log = SessionLog::new(&setup.run_id).starting_at(&setup.initial_checkpoint.commit);
    log.append(Turn::system(render_system_prompt(&SystemPromptInputs {
        executable: &request.executable,
        args: &request.args,
        workdir: &paths.root.display().to_string(),
        build_command: &config.build.command,
        max_turns: config.max_turns,
    })?));

    let mut turn = 0u32;
    loop {
        if debugger.has_exited() {
            let code = debugger.exit_status_code().unwrap_or(-1);
            let reason = format!("process exited with status {code}");
            info!(code, "debugged process exited");
            write_marker(&run, code == 0, &reason)?;
            git.checkpoint(&format!("debugloop: {} {reason}", setup.run_id), true)?;
            log.persist(paths)?;
            return finish(setup, &git, &run, turn, LoopStop::Exited { code });
        }

        if turn >= config.max_turns {
            warn!(max_turns = config.max_turns, "turn limit reached");
            write_marker(&run, false, "turn limit reached")?;
            log.persist(paths)?;
            let stop = LoopStop::MaxTurnsExceeded {
                max_turns: config.max_turns,
            };
            return finish(setup, &git, &run, turn, stop);
        }

        let prompt = if turn == 0 {
            initial_user_message(&debugger.stop_info()?)
        } else {
            NEXT_INSTRUCTION.to_string()
        };
        log.append(Turn::user(prompt));
        turn += 1;

        let started_at = Utc::now();
        let clock = Instant::now();
        let decision = source
            .next_decision(&DecisionRequest {
                turns: log.turns(),
                tools: menu.tools(),
            })
            .with_context(|| format!("request decision for turn {turn}"))?;
        log.append(decision.turn.clone());

        let mut records = Vec::new();
        let mut gave_up = None;
        {
            let mut ctx = ActionContext {
                config,
                paths,
                git: &git,
                builder,
                debugger: &mut *debugger,
            };
            for intent in menu.decode(&decision.turn).intents {
                let out = dispatch(&intent, &mut ctx, &mut log)?;
                records.push(IntentRecord {
                    call_id: intent.call_id.clone(),
                    kind: intent.kind.label().to_string(),
                    success: out.result.success,
                    output_bytes: out.result.output.len(),
                });
                if out.gave_up.is_some() {
                    gave_up = out.gave_up;
                    break;
                }
            }
        }

        let snapshot_id = match &gave_up {
            Some(id) => id.clone(),
            None => log.persist(paths)?,
        };
        let meta = TurnMeta {
            run_id: setup.run_id.clone(),
            turn,
            replayed: decision.replayed,
            started_at: Some(started_at.to_rfc3339()),
            ended_at: Some(Utc::now().to_rfc3339()),
            duration_ms: Some(clock.elapsed().as_millis() as u64),
            snapshot_id: Some(snapshot_id),
            intents: records,
        };
        write_turn(&TurnWriteRequest {
            run: &run,
            meta: &meta,
            fragments: &decision.fragments,
        })?;
        on_turn(&meta);

        if gave_up.is_some() {
            return finish(setup, &git, &run, turn, LoopStop::GaveUp);
        }
    }
}

/// Record the commit the run ended on.
fn finish(
    setup: &SessionSetup,
    git: &Git,
    run: &RunPaths,
    turns: u32,
    stop: LoopStop,
) -> Result<SessionOutcome> {
    let record = load_run_record(run)?
        .unwrap_or_else(|| RunRecord::started(&setup.run_id, &setup.initial_checkpoint.commit));
    write_run_record(run, &record.finished(git.head_sha()?, stop.label()))?;
    Ok(SessionOutcome {
        run_id: setup.run_id.clone(),
        turns,
        stop,
    })
}

/// `run-<UTC timestamp>-<6 lowercase alphanumerics>`.
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("run-{timestamp}-{suffix}")
}
