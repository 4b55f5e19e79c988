//! # Topicast
//!
//! Turns a topic into an article, a two-voice podcast and a cover image.
//!
//! A run searches the web for the topic, writes a long-form article from the
//! results, and then, concurrently:
//!
//! - rewrites the article as a Host/Guest dialogue, synthesizes every turn
//!   on a bounded worker pool and mixes the turns over ducked background
//!   music into one audio file
//! - derives an image prompt and renders a cover
//!
//! Every stage may fail on its own. Only stages that depend on a failed one
//! are skipped, and each run directory keeps a log, a manifest and whatever
//! artifacts did succeed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use topicast::prelude::*;
//!
//! let config = PipelineConfig::new().with_output_root("output");
//! let collaborators = Collaborators::from_config(&config)?;
//! let result = PipelineOrchestrator::new(config, collaborators)
//!     .run("DeepSeek R1")
//!     .await?;
//!
//! println!("{}", result.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod article;
pub mod audio;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod providers;
pub mod script;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audio::{AudioAssembler, AudioSegment, MixedTrack, PcmBuffer, SpeechSynthesisAdapter};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        AudioFormat, Credentials, MixConfig, PipelineConfig, ScriptConfig, StylePolicy,
        SynthesisConfig,
    };
    pub use crate::core::{
        Artifact, ArtifactKind, DialogueTurn, Speaker, Stage, StageStatus,
    };
    pub use crate::errors::{AssemblyError, ErrorKind, PipelineError, SynthesisError};
    pub use crate::events::{EventSink, LoggingEventSink, PipelineEvent};
    pub use crate::pipeline::{PipelineOrchestrator, RetryConfig, RunResult};
    pub use crate::providers::{
        Collaborators, ImageGenerator, SearchHit, SearchProvider, SpeechBackend, TextGenerator,
    };
    pub use crate::script::ScriptComposer;
    pub use crate::utils::{iso_timestamp, Timestamp};
}
