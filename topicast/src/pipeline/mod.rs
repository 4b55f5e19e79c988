//! Pipeline orchestration.
//!
//! This module provides:
//! - The orchestrator that sequences stages and applies the failure policy
//! - Per-run state: directory, stage ledger, artifacts, manifest
//! - The bounded retry policy wrapped around every external call

mod ledger;
mod orchestrator;
mod retry;
mod run;

#[cfg(test)]
mod integration_tests;

pub use ledger::{FailureRecord, LedgerSummary, StageLedger};
pub use orchestrator::PipelineOrchestrator;
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState,
    should_retry, with_retry,
};
pub use run::{PipelineRun, RunResult, StageOutcome};
