//! Output files published to a run directory.

use crate::core::Stage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// The named output files a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `article.md`
    Article,
    /// `script.json`
    Script,
    /// `script.txt`
    ScriptText,
    /// `podcast.mp3` (or `podcast.wav`)
    Podcast,
    /// `cover.jpg`
    Cover,
    /// `pipeline.log`
    Log,
    /// `manifest.json`
    Manifest,
}

impl ArtifactKind {
    /// Returns the default file name inside the run directory.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Article => "article.md",
            Self::Script => "script.json",
            Self::ScriptText => "script.txt",
            Self::Podcast => "podcast.mp3",
            Self::Cover => "cover.jpg",
            Self::Log => "pipeline.log",
            Self::Manifest => "manifest.json",
        }
    }

    /// The stage whose success publishes this artifact, if any.
    #[must_use]
    pub fn producer(&self) -> Option<Stage> {
        match self {
            Self::Article => Some(Stage::Article),
            Self::Script | Self::ScriptText => Some(Stage::Script),
            Self::Podcast => Some(Stage::Audio),
            Self::Cover => Some(Stage::Image),
            Self::Log | Self::Manifest => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Content produced by a stage that has not been published yet.
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    /// Which artifact this is.
    pub kind: ArtifactKind,
    /// File name inside the run directory.
    pub file_name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl PendingArtifact {
    /// Creates a pending artifact using the kind's default file name.
    #[must_use]
    pub fn new(kind: ArtifactKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            file_name: kind.file_name().to_string(),
            bytes,
        }
    }

    /// Overrides the file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

/// A file published to the run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Which artifact this is.
    pub kind: ArtifactKind,
    /// Absolute or run-relative path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
    /// When the artifact was published (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Describes published content.
    #[must_use]
    pub fn describe(kind: ArtifactKind, path: PathBuf, bytes: &[u8]) -> Self {
        Self {
            kind,
            path,
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            created_at: crate::utils::iso_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(ArtifactKind::Article.file_name(), "article.md");
        assert_eq!(ArtifactKind::Podcast.file_name(), "podcast.mp3");
        assert_eq!(ArtifactKind::Cover.file_name(), "cover.jpg");
        assert_eq!(ArtifactKind::Script.file_name(), "script.json");
        assert_eq!(ArtifactKind::Log.file_name(), "pipeline.log");
    }

    #[test]
    fn test_producers() {
        assert_eq!(ArtifactKind::Podcast.producer(), Some(Stage::Audio));
        assert_eq!(ArtifactKind::ScriptText.producer(), Some(Stage::Script));
        assert_eq!(ArtifactKind::Log.producer(), None);
    }

    #[test]
    fn test_describe_hashes_content() {
        let artifact = Artifact::describe(ArtifactKind::Article, PathBuf::from("article.md"), b"abc");

        assert_eq!(artifact.size_bytes, 3);
        assert_eq!(
            artifact.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pending_file_name_override() {
        let pending = PendingArtifact::new(ArtifactKind::Podcast, vec![1, 2])
            .with_file_name("podcast.wav");
        assert_eq!(pending.file_name, "podcast.wav");
    }
}
