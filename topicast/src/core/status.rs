//! Stage identifiers and stage status.

use crate::errors::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One named unit of orchestrated work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Retrieve ranked snippets for the topic.
    Search,
    /// Write the long-form article from the search results.
    Article,
    /// Turn the article into a two-speaker dialogue.
    Script,
    /// Synthesize and mix the dialogue into one audio file.
    Audio,
    /// Render the cover image.
    Image,
}

impl Stage {
    /// All stages in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Search,
        Self::Article,
        Self::Script,
        Self::Audio,
        Self::Image,
    ];

    /// Stages that must have succeeded before this one may start.
    #[must_use]
    pub fn dependencies(&self) -> &'static [Self] {
        match self {
            Self::Search => &[],
            Self::Article => &[Self::Search],
            Self::Script | Self::Image => &[Self::Article],
            Self::Audio => &[Self::Script],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Article => write!(f, "article"),
            Self::Script => write!(f, "script"),
            Self::Audio => write!(f, "audio"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Classification of the last error.
    pub kind: ErrorKind,
    /// The last error message.
    pub message: String,
}

impl StageFailure {
    /// Creates a failure from its parts.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&PipelineError> for StageFailure {
    fn from(err: &PipelineError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Succeeded,
    /// Stage failed.
    Failed(StageFailure),
    /// Stage was not attempted.
    Skipped(String),
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(_) => write!(f, "failed"),
            Self::Skipped(_) => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Skipped(_))
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the failure or skip reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Failed(failure) => Some(failure.to_string()),
            Self::Skipped(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// Pending may go to Running or Skipped; Running may go to any terminal
    /// state. Terminal states never change.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Skipped(_)) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}
