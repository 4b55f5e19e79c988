//! Stage status bookkeeping and the partial-failure policy.
//!
//! Only the orchestrator mutates the ledger. A stage may start only when all
//! its prerequisites succeeded; otherwise it is skipped with a reason naming
//! the blocking prerequisite. Failures never propagate further than that.

use crate::core::{Stage, StageFailure, StageStatus};
use crate::errors::{ErrorKind, PipelineError};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of a stage that did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The stage.
    pub stage: Stage,
    /// Classification of the error, `None` for skips.
    pub kind: Option<ErrorKind>,
    /// Error message or skip reason.
    pub message: String,
    /// When the stage reached its terminal state.
    pub timestamp: Timestamp,
}

/// Counts of terminal states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Stages that succeeded.
    pub succeeded: usize,
    /// Stages that failed.
    pub failed: usize,
    /// Stages that were skipped.
    pub skipped: usize,
    /// Stages still pending or running.
    pub unfinished: usize,
}

/// The status map of one run.
#[derive(Debug, Clone)]
pub struct StageLedger {
    statuses: BTreeMap<Stage, StageStatus>,
    failures: Vec<FailureRecord>,
}

impl Default for StageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StageLedger {
    /// Creates a ledger with every stage pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            statuses: Stage::ALL.iter().map(|s| (*s, StageStatus::Pending)).collect(),
            failures: Vec::new(),
        }
    }

    /// Current status of `stage`.
    #[must_use]
    pub fn status(&self, stage: Stage) -> StageStatus {
        self.statuses.get(&stage).cloned().unwrap_or_default()
    }

    /// Moves `stage` to `next`.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an illegal transition; the ledger is
    /// left unchanged.
    pub fn transition(&mut self, stage: Stage, next: StageStatus) -> Result<(), PipelineError> {
        let current = self.status(stage);
        if !current.can_transition_to(&next) {
            return Err(PipelineError::Internal(format!(
                "illegal transition for stage {stage}: {current} -> {next}"
            )));
        }

        match &next {
            StageStatus::Failed(StageFailure { kind, message }) => self.failures.push(FailureRecord {
                stage,
                kind: Some(*kind),
                message: message.clone(),
                timestamp: now_utc(),
            }),
            StageStatus::Skipped(reason) => self.failures.push(FailureRecord {
                stage,
                kind: None,
                message: reason.clone(),
                timestamp: now_utc(),
            }),
            _ => {}
        }
        self.statuses.insert(stage, next);
        Ok(())
    }

    /// Returns why `stage` may not start, or `None` if every prerequisite
    /// succeeded.
    #[must_use]
    pub fn blocked_reason(&self, stage: Stage) -> Option<String> {
        stage.dependencies().iter().find_map(|dep| {
            let status = self.status(*dep);
            (!status.is_success()).then(|| format!("prerequisite {dep} {status}"))
        })
    }

    /// Records of stages that failed or were skipped, in order.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Copy of the status map.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Stage, StageStatus> {
        self.statuses.clone()
    }

    /// Counts stages per terminal state.
    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for status in self.statuses.values() {
            match status {
                StageStatus::Succeeded => summary.succeeded += 1,
                StageStatus::Failed(_) => summary.failed += 1,
                StageStatus::Skipped(_) => summary.skipped += 1,
                StageStatus::Pending | StageStatus::Running => summary.unfinished += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed(kind: ErrorKind) -> StageStatus {
        StageStatus::Failed(StageFailure::new(kind, "boom"))
    }

    #[test]
    fn test_new_ledger_is_pending() {
        let ledger = StageLedger::new();
        for stage in Stage::ALL {
            assert_eq!(ledger.status(stage), StageStatus::Pending);
        }
        assert_eq!(ledger.summary().unfinished, 5);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut ledger = StageLedger::new();

        let err = ledger
            .transition(Stage::Search, StageStatus::Succeeded)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(ledger.status(Stage::Search), StageStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut ledger = StageLedger::new();
        ledger.transition(Stage::Search, StageStatus::Running).unwrap();
        ledger.transition(Stage::Search, StageStatus::Succeeded).unwrap();

        assert!(ledger.transition(Stage::Search, StageStatus::Running).is_err());
    }

    #[test]
    fn test_dependents_are_blocked_by_failure() {
        let mut ledger = StageLedger::new();
        ledger.transition(Stage::Search, StageStatus::Running).unwrap();
        ledger.transition(Stage::Search, StageStatus::Succeeded).unwrap();
        ledger.transition(Stage::Article, StageStatus::Running).unwrap();
        ledger.transition(Stage::Article, StageStatus::Succeeded).unwrap();
        ledger.transition(Stage::Script, StageStatus::Running).unwrap();
        ledger
            .transition(Stage::Script, failed(ErrorKind::Content))
            .unwrap();

        assert_eq!(ledger.blocked_reason(Stage::Image), None);
        assert_eq!(
            ledger.blocked_reason(Stage::Audio),
            Some("prerequisite script failed".to_string())
        );
    }

    #[test]
    fn test_pending_prerequisite_blocks() {
        let ledger = StageLedger::new();
        assert_eq!(ledger.blocked_reason(Stage::Search), None);
        assert_eq!(
            ledger.blocked_reason(Stage::Article),
            Some("prerequisite search pending".to_string())
        );
    }

    #[test]
    fn test_failures_and_summary() {
        let mut ledger = StageLedger::new();
        ledger.transition(Stage::Search, StageStatus::Running).unwrap();
        ledger
            .transition(Stage::Search, failed(ErrorKind::TransientService))
            .unwrap();
        for stage in [Stage::Article, Stage::Script, Stage::Audio, Stage::Image] {
            let reason = ledger.blocked_reason(stage).unwrap();
            ledger.transition(stage, StageStatus::Skipped(reason)).unwrap();
        }

        let summary = ledger.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 4);
        assert_eq!(ledger.failures().len(), 5);
        assert_eq!(ledger.failures()[0].kind, Some(ErrorKind::TransientService));
        assert_eq!(ledger.failures()[1].message, "prerequisite search failed");
    }
}
