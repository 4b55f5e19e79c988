//! Article to dialogue composition.

use crate::config::{ScriptConfig, StylePolicy};
use crate::core::{DialogueTurn, Speaker};
use crate::errors::PipelineError;
use crate::script::text::{is_stage_direction, join_sentences, speech_units, split_sentences, strip_markdown};
use tracing::debug;

/// Converts article text into an ordered two-role dialogue.
///
/// Every script it returns satisfies the same invariants: indices are
/// contiguous from 0, no turn is empty, both roles speak, and there are at
/// most `max_turns` turns.
#[derive(Debug, Clone)]
pub struct ScriptComposer {
    config: ScriptConfig,
}

impl ScriptComposer {
    /// Creates a composer.
    #[must_use]
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    /// Gets the composer settings.
    #[must_use]
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Composes a dialogue directly from the article.
    ///
    /// Sentences are packed into turns in reading order and the turns are
    /// assigned to roles according to the style policy.
    ///
    /// # Errors
    ///
    /// Returns a content error when the article is empty, shorter than
    /// `min_source_chars` after markdown removal, or has fewer than two
    /// sentences.
    pub fn compose(&self, article: &str) -> Result<Vec<DialogueTurn>, PipelineError> {
        if article.trim().is_empty() {
            return Err(PipelineError::content("article is empty"));
        }

        let plain = strip_markdown(article);
        let chars = plain.chars().filter(|c| !c.is_whitespace()).count();
        if chars < self.config.min_source_chars {
            return Err(PipelineError::content(format!(
                "article has {chars} characters of text, at least {} needed",
                self.config.min_source_chars
            )));
        }

        let sentences = split_sentences(&plain);
        if sentences.len() < 2 {
            return Err(PipelineError::content(
                "article needs at least two sentences for a dialogue",
            ));
        }

        let roles = plan_roles(sentences.len().min(self.config.max_turns.max(2)), self.config.style);
        let drafts = pack(&sentences, roles.len(), self.config.max_turn_chars)
            .into_iter()
            .zip(roles)
            .map(|(text, speaker)| (speaker, text))
            .collect();

        let turns = self.normalize(drafts)?;
        debug!(
            sentences = sentences.len(),
            turns = turns.len(),
            "Composed dialogue from article"
        );
        Ok(turns)
    }

    /// Turns drafted (speaker, text) pairs into a valid script.
    ///
    /// Blank lines and stage directions are removed. A turn longer than
    /// `max_turn_chars` is split at sentence boundaries into consecutive
    /// turns of the same speaker. The remainder is capped at `max_turns` and
    /// re-indexed from 0.
    ///
    /// # Errors
    ///
    /// Returns a content error when nothing usable remains or only one role
    /// speaks.
    pub fn normalize(&self, drafts: Vec<(Speaker, String)>) -> Result<Vec<DialogueTurn>, PipelineError> {
        let turns: Vec<DialogueTurn> = drafts
            .into_iter()
            .map(|(speaker, text)| (speaker, text.trim().to_string()))
            .filter(|(_, text)| !text.is_empty() && !is_stage_direction(text))
            .flat_map(|(speaker, text)| {
                split_long(&text, self.config.max_turn_chars)
                    .into_iter()
                    .map(move |piece| (speaker, piece))
            })
            .take(self.config.max_turns.max(2))
            .enumerate()
            .map(|(index, (speaker, text))| {
                let hint = self.estimate_duration(&text);
                DialogueTurn::new(index, speaker, text, hint)
            })
            .collect();

        if turns.is_empty() {
            return Err(PipelineError::content("script has no turns"));
        }
        let has_host = turns.iter().any(|t| t.speaker == Speaker::Host);
        let has_guest = turns.iter().any(|t| t.speaker == Speaker::Guest);
        if !(has_host && has_guest) {
            return Err(PipelineError::content("script needs turns from both Host and Guest"));
        }
        Ok(turns)
    }

    /// Estimates speaking time of `text` in seconds.
    #[must_use]
    pub fn estimate_duration(&self, text: &str) -> f64 {
        let rate = if self.config.speech_units_per_second > 0.0 {
            self.config.speech_units_per_second
        } else {
            1.0
        };
        let seconds = speech_units(text) as f64 / rate;
        (seconds * 100.0).round() / 100.0
    }
}

/// Chooses the role of each turn for up to `available` turns.
///
/// The Host opens, and whenever three or more turns are planned the Host also
/// closes. The count is trimmed so the policy's pattern ends on a Host turn.
fn plan_roles(available: usize, style: StylePolicy) -> Vec<Speaker> {
    if available < 3 {
        return [Speaker::Host, Speaker::Guest]
            .into_iter()
            .take(available)
            .collect();
    }

    let guest_run = match style {
        StylePolicy::Alternating => 1,
        StylePolicy::Interview { guest_run } => guest_run.max(1),
    };
    let period = guest_run + 1;
    let count = (available - 1) / period * period + 1;

    if count < period + 1 {
        // Not enough material for one full exchange: Host, Guest..., Host.
        return (0..available)
            .map(|i| if i == 0 || i == available - 1 { Speaker::Host } else { Speaker::Guest })
            .collect();
    }

    (0..count)
        .map(|i| if i % period == 0 { Speaker::Host } else { Speaker::Guest })
        .collect()
}

/// Packs sentences into `turns` contiguous groups of near-equal size.
///
/// Groups longer than `max_chars` keep their leading sentences only; a
/// single oversized sentence is cut at a character boundary.
fn pack(sentences: &[String], turns: usize, max_chars: usize) -> Vec<String> {
    let total = sentences.len();
    (0..turns)
        .map(|i| {
            let group = &sentences[i * total / turns..(i + 1) * total / turns];
            let mut kept: Vec<&str> = Vec::new();
            let mut len = 0;
            for sentence in group {
                let n = sentence.chars().count();
                if !kept.is_empty() && len + n > max_chars {
                    break;
                }
                kept.push(sentence);
                len += n;
            }
            let joined = join_sentences(&kept);
            if joined.chars().count() > max_chars && max_chars > 0 {
                joined.chars().take(max_chars).collect()
            } else {
                joined
            }
        })
        .collect()
}

/// Splits `text` into pieces of at most `max_chars` characters.
///
/// Whole sentences are kept together where they fit; a single oversized
/// sentence is cut at character boundaries.
fn split_long(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for sentence in split_sentences(text) {
        current.push(sentence);
        if join_sentences(&current).chars().count() <= max_chars {
            continue;
        }
        let Some(sentence) = current.pop() else { continue };
        if !current.is_empty() {
            pieces.push(join_sentences(&current));
            current.clear();
        }
        if sentence.chars().count() <= max_chars {
            current.push(sentence);
        } else {
            let chars: Vec<char> = sentence.chars().collect();
            pieces.extend(
                chars
                    .chunks(max_chars)
                    .map(|chunk| chunk.iter().collect::<String>().trim().to_string())
                    .filter(|piece| !piece.is_empty()),
            );
        }
    }
    if !current.is_empty() {
        pieces.push(join_sentences(&current));
    }
    pieces
}
