//! State machine for one patch transaction.
//!
//! ```text
//! Validated -> DryRun -> Applied -> Built -> Committed
//!                 |          |         |
//!                 v          v         v
//!              (Failed)  RolledBack  RolledBack
//! ```
//!
//! A failed dry run ends the transaction without touching the tree, so it has
//! no state of its own; the transaction just finishes as `Failed` from
//! `DryRun`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Validated,
    DryRun,
    Applied,
    Built,
    Committed,
    RolledBack,
}

impl TxState {
    fn allows(self, next: TxState) -> bool {
        use TxState::{Applied, Built, Committed, DryRun, RolledBack, Validated};
        matches!(
            (self, next),
            (Validated, DryRun)
                | (DryRun, Applied)
                | (Applied, Built)
                | (Applied, RolledBack)
                | (Built, Committed)
                | (Built, RolledBack)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transaction transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TxState,
    pub to: TxState,
}

/// Current state plus the trail of visited states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    state: TxState,
    trail: Vec<TxState>,
    outcome: Option<TxOutcome>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// A transaction whose edits have already been validated.
    pub fn new() -> Self {
        Self {
            state: TxState::Validated,
            trail: vec![TxState::Validated],
            outcome: None,
        }
    }

    pub fn trail(&self) -> &[TxState] {
        &self.trail
    }

    pub fn outcome(&self) -> Option<TxOutcome> {
        self.outcome
    }

    pub fn advance(&mut self, next: TxState) -> Result<(), TransitionError> {
        if self.outcome.is_some() || !self.state.allows(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.trail.push(next);
        if next == TxState::RolledBack {
            self.outcome = Some(TxOutcome::Failed);
        }
        Ok(())
    }

    /// Close the transaction. `Committed` finishes as success, a rollback or a
    /// failed dry run as failure.
    pub fn finish(&mut self) -> Result<TxOutcome, TransitionError> {
        let outcome = match self.state {
            TxState::Committed => TxOutcome::Success,
            TxState::RolledBack | TxState::DryRun => TxOutcome::Failed,
            other => {
                return Err(TransitionError {
                    from: other,
                    to: other,
                });
            }
        };
        self.outcome = Some(outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_commits() {
        let mut tx = Transaction::new();
        for next in [TxState::DryRun, TxState::Applied, TxState::Built, TxState::Committed] {
            tx.advance(next).expect("allowed");
        }
        assert_eq!(tx.finish().expect("finish"), TxOutcome::Success);
        assert_eq!(
            tx.trail(),
            &[
                TxState::Validated,
                TxState::DryRun,
                TxState::Applied,
                TxState::Built,
                TxState::Committed
            ]
        );
    }

    #[test]
    fn build_failure_rolls_back() {
        let mut tx = Transaction::new();
        tx.advance(TxState::DryRun).expect("dry run");
        tx.advance(TxState::Applied).expect("applied");
        tx.advance(TxState::RolledBack).expect("rollback");
        assert_eq!(tx.outcome(), Some(TxOutcome::Failed));
        assert_eq!(tx.finish().expect("finish"), TxOutcome::Failed);
    }

    #[test]
    fn failed_dry_run_finishes_without_touching_anything() {
        let mut tx = Transaction::new();
        tx.advance(TxState::DryRun).expect("dry run");
        assert_eq!(tx.finish().expect("finish"), TxOutcome::Failed);
        assert!(tx.advance(TxState::Applied).is_err());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut tx = Transaction::new();
        let err = tx.advance(TxState::Committed).expect_err("skip ahead");
        assert_eq!(err.from, TxState::Validated);
        assert_eq!(err.to, TxState::Committed);
        assert_eq!(tx.trail(), &[TxState::Validated]);
        assert!(tx.finish().is_err());
    }

    #[test]
    fn rolled_back_transaction_cannot_continue() {
        let mut tx = Transaction::new();
        tx.advance(TxState::DryRun).expect("dry run");
        tx.advance(TxState::Applied).expect("applied");
        tx.advance(TxState::RolledBack).expect("rollback");
        assert!(tx.advance(TxState::Built).is_err());
    }
}
