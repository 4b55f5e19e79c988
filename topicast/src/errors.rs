//! Error types for the topicast pipeline.
//!
//! Every failure is resolved at a stage boundary. The [`ErrorKind`] of an
//! error decides what the orchestrator does with it: configuration problems
//! skip the stage, transient service problems are retried, everything else
//! fails the stage immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A credential or setting is missing. The stage is skipped.
    Configuration,
    /// Intermediate content is malformed or insufficient.
    Content,
    /// Network, timeout or rate-limit problem worth retrying.
    TransientService,
    /// The remote service rejected the request permanently.
    Service,
    /// The audio timeline is inconsistent.
    Assembly,
    /// The run was cancelled or timed out.
    Cancelled,
    /// Local failure (filesystem, encoding, serialization, join errors).
    Internal,
}

impl ErrorKind {
    /// Returns true if an error of this kind may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientService)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "ConfigurationError"),
            Self::Content => write!(f, "ContentError"),
            Self::TransientService => write!(f, "TransientServiceError"),
            Self::Service => write!(f, "ServiceError"),
            Self::Assembly => write!(f, "AssemblyError"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Internal => write!(f, "InternalError"),
        }
    }
}

/// Errors that know whether retrying them makes sense.
pub trait Retryable {
    /// Returns true if the failed call should be attempted again.
    fn is_retryable(&self) -> bool;
}

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required credential or setting is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Intermediate content is malformed or too short to use.
    #[error("Content error: {0}")]
    Content(String),

    /// A remote call failed in a way that may succeed later.
    #[error("Transient service error from {service}: {message}")]
    TransientService {
        /// The service that failed.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// A remote call was rejected and will not succeed on retry.
    #[error("Service error from {service}: {message}")]
    Service {
        /// The service that failed.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// Speech synthesis failed.
    #[error("{0}")]
    Synthesis(#[from] SynthesisError),

    /// The audio timeline could not be assembled.
    #[error("{0}")]
    Assembly(#[from] AssemblyError),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Audio could not be decoded or encoded.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a content error.
    #[must_use]
    pub fn content(message: impl Into<String>) -> Self {
        Self::Content(message.into())
    }

    /// Creates a transient service error.
    #[must_use]
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a permanent service error.
    #[must_use]
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Classifies an HTTP status code returned by `service`.
    ///
    /// 408, 429 and 5xx are transient; every other non-success code is not.
    #[must_use]
    pub fn from_status(service: impl Into<String>, status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", truncate(body, 200));
        if status == 408 || status == 429 || status >= 500 {
            Self::transient(service, message)
        } else {
            Self::service(service, message)
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Content(_) => ErrorKind::Content,
            Self::TransientService { .. } => ErrorKind::TransientService,
            Self::Service { .. } => ErrorKind::Service,
            Self::Synthesis(err) => err.kind(),
            Self::Assembly(_) => ErrorKind::Assembly,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Internal(_) | Self::Codec(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the speech synthesis adapter.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// The text to synthesize was empty.
    #[error("Synthesis rejected: text is empty")]
    EmptyText,

    /// The text exceeded the per-call limit.
    #[error("Synthesis rejected: text has {len} characters, limit is {max}")]
    TextTooLong {
        /// Length of the rejected text in characters.
        len: usize,
        /// The configured limit.
        max: usize,
    },

    /// The call did not finish in time.
    #[error("Synthesis timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The speech service returned an error.
    #[error("Speech service error: {message}")]
    Service {
        /// Description of the failure.
        message: String,
        /// Whether a later attempt may succeed.
        retryable: bool,
    },

    /// The returned audio could not be decoded.
    #[error("Could not decode synthesized audio: {0}")]
    Decode(String),
}

impl SynthesisError {
    /// Creates a transient service error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a permanent service error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyText | Self::TextTooLong { .. } | Self::Decode(_) => ErrorKind::Content,
            Self::Timeout { .. } | Self::Service { retryable: true, .. } => {
                ErrorKind::TransientService
            }
            Self::Service { retryable: false, .. } => ErrorKind::Service,
        }
    }
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Errors raised while building the speech timeline.
///
/// These point at a bookkeeping bug upstream of the assembler, never at a
/// transient condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// No turns were expected.
    #[error("Assembly error: no turns to assemble")]
    NoTurns,

    /// A turn index in the expected range never arrived.
    #[error("Assembly error: segment for turn {index} is missing ({received} of {expected} received)")]
    MissingTurn {
        /// The first missing index.
        index: usize,
        /// How many segments were received.
        received: usize,
        /// How many turns were expected.
        expected: usize,
    },

    /// The same turn index arrived twice.
    #[error("Assembly error: duplicate segment for turn {index}")]
    DuplicateTurn {
        /// The duplicated index.
        index: usize,
    },

    /// A segment index lies outside the expected range.
    #[error("Assembly error: turn {index} is outside the expected range 0..{expected}")]
    UnexpectedTurn {
        /// The out-of-range index.
        index: usize,
        /// How many turns were expected.
        expected: usize,
    },

    /// A segment does not share the timeline's sample rate.
    #[error("Assembly error: turn {index} has sample rate {found}Hz, timeline uses {expected}Hz")]
    SampleRateMismatch {
        /// The offending turn.
        index: usize,
        /// The segment's sample rate.
        found: u32,
        /// The timeline's sample rate.
        expected: u32,
    },
}

/// Errors raised while decoding or encoding audio containers.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The input is not a supported audio container.
    #[error("Audio decode failed: {0}")]
    Decode(String),

    /// The encoder rejected its settings or input.
    #[error("Audio encode failed: {0}")]
    Encode(String),
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
