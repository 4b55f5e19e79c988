//! Core domain model types for topicast.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identifiers and status
//! - Dialogue roles and turns
//! - Run artifacts

mod artifact;
mod status;
mod turn;

pub use artifact::{Artifact, ArtifactKind, PendingArtifact};
pub use status::{Stage, StageFailure, StageStatus};
pub use turn::{DialogueTurn, Speaker};
