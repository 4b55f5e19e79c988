//! Run events and the sinks that record them.
//!
//! The orchestrator emits a [`PipelineEvent`] for every stage transition and
//! published artifact. [`RunLogSink`] turns them into the append-only
//! `pipeline.log`; [`LoggingEventSink`] forwards them to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, RunLogSink};

use crate::core::{ArtifactKind, Stage, StageStatus};
use crate::errors::ErrorKind;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A run directory was created.
    RunStarted {
        /// The topic.
        topic: String,
        /// Run identifier.
        run_id: String,
        /// The run directory.
        run_dir: PathBuf,
    },
    /// A stage changed status.
    StageTransition {
        /// The stage.
        stage: Stage,
        /// The new status.
        status: StageStatus,
    },
    /// An artifact was written to the run directory.
    ArtifactPublished {
        /// Which artifact.
        kind: ArtifactKind,
        /// Where it was written.
        path: PathBuf,
    },
    /// The run is over.
    RunFinished {
        /// Whether the article was produced.
        success: bool,
    },
}

/// A timestamped run event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// When the event happened.
    pub timestamp: Timestamp,
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl PipelineEvent {
    /// Creates an event stamped now.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: now_utc(),
            kind,
        }
    }

    /// Dotted event type, e.g. `stage.transition`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::RunStarted { .. } => "run.started",
            EventKind::StageTransition { .. } => "stage.transition",
            EventKind::ArtifactPublished { .. } => "artifact.published",
            EventKind::RunFinished { .. } => "run.finished",
        }
    }

    /// Returns true for failures that indicate a bug rather than a flaky
    /// service.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            &self.kind,
            EventKind::StageTransition { status: StageStatus::Failed(f), .. }
                if matches!(f.kind, ErrorKind::Assembly | ErrorKind::Internal)
        )
    }

    /// Returns true for other failures and skips.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        match &self.kind {
            EventKind::StageTransition { status, .. } => {
                !self.is_error() && (status.is_failure() || matches!(status, StageStatus::Skipped(_)))
            }
            EventKind::RunFinished { success } => !success,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::RunStarted { topic, run_id, run_dir } => write!(
                f,
                "run started: topic={topic:?} id={run_id} dir={}",
                run_dir.display()
            ),
            EventKind::StageTransition { stage, status } => match status.reason() {
                Some(reason) => write!(f, "[{stage}] {status}: {reason}"),
                None => write!(f, "[{stage}] {status}"),
            },
            EventKind::ArtifactPublished { kind, path } => {
                write!(f, "artifact published: {kind} ({})", path.display())
            }
            EventKind::RunFinished { success: true } => write!(f, "run finished: success"),
            EventKind::RunFinished { success: false } => write!(f, "run finished: failed"),
        }
    }
}
