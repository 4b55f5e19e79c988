//! Dialogue roles and turns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two fixed dialogue roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    /// Steers the conversation, opens and closes the show.
    Host,
    /// Reacts, explains and comments.
    Guest,
}

impl Speaker {
    /// Returns the other role.
    #[must_use]
    pub fn other(&self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    /// Parses a role label as written by a script author.
    ///
    /// Unknown labels yield `None`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "host" | "主持人" | "a" => Some(Self::Host),
            "guest" | "嘉宾" | "b" => Some(Self::Guest),
            _ => None,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "Host"),
            Self::Guest => write!(f, "Guest"),
        }
    }
}

/// One utterance by one role within the script.
///
/// Turns are immutable once composed; `index` is the turn's position in the
/// script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// Zero-based position in the script.
    pub index: usize,
    /// Who speaks this turn.
    pub speaker: Speaker,
    /// What is said.
    pub text: String,
    /// Estimated speaking time in seconds.
    pub duration_hint: f64,
}

impl DialogueTurn {
    /// Creates a turn.
    #[must_use]
    pub fn new(index: usize, speaker: Speaker, text: impl Into<String>, duration_hint: f64) -> Self {
        Self {
            index,
            speaker,
            text: text.into(),
            duration_hint,
        }
    }

    /// Renders the turn as a readable script line.
    #[must_use]
    pub fn to_script_line(&self) -> String {
        format!("[{}]: {}", self.speaker, self.text)
    }
}
