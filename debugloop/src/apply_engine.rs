//! Transactional patch application.
//!
//! A validated [`PatchPlan`] is dry-run, written, built, and either committed
//! as a new checkpoint or rolled back to the previous one. Between turns the
//! working tree therefore always matches a commit that built.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::error::{BuildError, SessionError};
use crate::core::patch::PatchPlan;
use crate::core::transaction::{Transaction, TxOutcome, TxState};
use crate::core::types::{ActionResult, Checkpoint};
use crate::dispatch::ActionContext;
use crate::io::build::BuildRunner;
use crate::io::debugger::{DebuggerSession, SessionReply};
use crate::io::workspace;

/// Everything a finished transaction reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReport {
    pub outcome: TxOutcome,
    pub trail: Vec<TxState>,
    pub checkpoint: Option<Checkpoint>,
    pub result: ActionResult,
}

/// Run `plan` through dry run, apply, build and commit or rollback.
///
/// Errors are infrastructure failures (git, the build runner itself); every
/// patch or build problem is a `Failed` report.
#[instrument(skip_all, fields(path = %plan.path))]
pub fn apply_patch<D: DebuggerSession, B: BuildRunner>(
    ctx: &mut ActionContext<'_, D, B>,
    plan: &PatchPlan,
) -> Result<TxReport> {
    let workdir = ctx.workdir().to_path_buf();
    let mut tx = Transaction::new();

    tx.advance(TxState::DryRun)?;
    if let Err(err) = workspace::dry_run(&workdir, &plan.diff) {
        warn!(error = %err, "dry run failed");
        let output = format!("Patch did not apply:\n{}\n{err}", plan.diff);
        return finish(tx, None, ActionResult::failed(output));
    }

    tx.advance(TxState::Applied)?;
    if let Err(err) = workspace::apply_to_disk(&workdir, &plan.diff) {
        warn!(error = %err, "apply failed");
        ctx.git.reset_to_last_commit()?;
        tx.advance(TxState::RolledBack)?;
        let output = format!("Patch could not be written:\n{}\n{err}", plan.diff);
        return finish(tx, None, ActionResult::failed(output));
    }

    let build = match ctx.builder.run(&ctx.build_request()) {
        Ok(out) => out,
        Err(err) => {
            ctx.git.reset_to_last_commit()?;
            let Some(build_err) = err.downcast_ref::<BuildError>() else {
                return Err(err.context("run build"));
            };
            tx.advance(TxState::RolledBack)?;
            let output = format!("{build_err}\nRolled back patch:\n{}", plan.diff);
            return finish(tx, None, ActionResult::failed(output));
        }
    };

    if !build.success() {
        info!(code = ?build.exit_code, "build failed, rolling back");
        ctx.git.reset_to_last_commit()?;
        tx.advance(TxState::RolledBack)?;
        let output = format!(
            "Build failed after applying the patch.\n{}Rolled back patch:\n{}",
            build.render(),
            plan.diff
        );
        return finish(tx, None, ActionResult::failed(output));
    }

    tx.advance(TxState::Built)?;
    let checkpoint = ctx
        .git
        .checkpoint(&format!("debugloop: patch {}", plan.path), false)?;
    tx.advance(TxState::Committed)?;
    info!(commit = %checkpoint.commit, "patch committed");

    let restart = match ctx.debugger.restart() {
        Ok(reply) if reply.success => reply,
        Ok(reply) => SessionReply::failed(format!("Restart failed: {}", reply.output)),
        Err(err) => match err.downcast_ref::<SessionError>() {
            Some(session_err) => SessionReply::failed(format!("Restart failed: {session_err}")),
            None => return Err(err),
        },
    };
    let mut output = format!("Patch applied:\n{}", plan.diff);
    let build_log = build.render();
    if !build_log.trim().is_empty() {
        output.push_str(&build_log);
    }
    output.push_str(&restart.output);
    finish(tx, Some(checkpoint), ActionResult::new(restart.success, output))
}

fn finish(
    mut tx: Transaction,
    checkpoint: Option<Checkpoint>,
    result: ActionResult,
) -> Result<TxReport> {
    let outcome = tx.finish()?;
    Ok(TxReport {
        outcome,
        trail: tx.trail().to_vec(),
        checkpoint,
        result,
    })
}
