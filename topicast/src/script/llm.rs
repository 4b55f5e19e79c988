//! Dialogue drafted by the text generator.
//!
//! The generator is asked for a JSON array of `{"role", "text"}` objects.
//! Whatever comes back is run through [`ScriptComposer::normalize`]; if it
//! cannot be parsed or normalized, the heuristic script is used instead.

use crate::core::{DialogueTurn, Speaker};
use crate::errors::{ErrorKind, PipelineError};
use crate::pipeline::{with_retry, RetryConfig};
use crate::providers::{GenerationRequest, TextGenerator};
use crate::script::composer::ScriptComposer;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{info, warn};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[a-zA-Z]*").expect("valid regex"));

const SYSTEM_PROMPT: &str =
    "You are a podcast producer who writes lively, natural two-person conversations.";

#[derive(Debug, Deserialize)]
struct DraftLine {
    #[serde(alias = "speaker")]
    role: String,
    text: String,
}

/// Builds the script-writing prompt for `article`.
#[must_use]
pub fn script_prompt(article: &str, max_turns: usize) -> String {
    format!(
        "Rewrite the article below as a podcast conversation between two people.\n\n\
         Roles:\n\
         - Host: calm and professional, steers the topic, opens and closes the show.\n\
         - Guest: a sharp, funny tech enthusiast who explains with analogies.\n\n\
         Rules:\n\
         1. Reply with a JSON array only, no markdown.\n\
         2. Each element is {{\"role\": \"Host\" or \"Guest\", \"text\": \"...\"}}.\n\
         3. Keep it conversational; the Host greets the audience first and signs off last.\n\
         4. Use at most {max_turns} turns.\n\n\
         Article:\n{article}"
    )
}

/// Parses a generator reply into (speaker, text) drafts.
///
/// Code fences and any prose around the outermost JSON array are ignored.
/// Lines with an unknown role are dropped.
///
/// # Errors
///
/// Returns a content error if no JSON array can be found or decoded.
pub fn parse_script(reply: &str) -> Result<Vec<(Speaker, String)>, PipelineError> {
    let cleaned = CODE_FENCE.replace_all(reply, "");
    let start = cleaned.find('[');
    let end = cleaned.rfind(']');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Err(PipelineError::content("script reply contains no JSON array")),
    };

    let lines: Vec<DraftLine> = serde_json::from_str(json)
        .map_err(|e| PipelineError::content(format!("script reply is not valid JSON: {e}")))?;

    Ok(lines
        .into_iter()
        .filter_map(|line| Speaker::from_label(&line.role).map(|speaker| (speaker, line.text)))
        .collect())
}

/// Composes the dialogue, preferring a generator-drafted script.
///
/// The article is validated by the heuristic composer first, so an unusable
/// article fails the same way with or without a generator.
///
/// # Errors
///
/// Returns a content error for an unusable article, or a cancellation error
/// if the run is aborted while the generator is working.
pub async fn compose_dialogue(
    composer: &ScriptComposer,
    generator: Option<&dyn TextGenerator>,
    retry: &RetryConfig,
    article: &str,
) -> Result<Vec<DialogueTurn>, PipelineError> {
    let fallback = composer.compose(article)?;

    let Some(generator) = generator.filter(|_| composer.config().use_llm) else {
        return Ok(fallback);
    };

    let request = GenerationRequest::new(script_prompt(article, composer.config().max_turns))
        .with_system(SYSTEM_PROMPT)
        .with_temperature(0.8);
    let drafted = with_retry(retry, "script", || generator.generate(&request))
        .await
        .and_then(|reply| parse_script(&reply))
        .and_then(|drafts| composer.normalize(drafts));

    match drafted {
        Ok(turns) => {
            info!(turns = turns.len(), "Using generated dialogue");
            Ok(turns)
        }
        Err(e) if e.kind() == ErrorKind::Cancelled => Err(e),
        Err(e) => {
            warn!(error = %e, "Generated dialogue unusable, falling back to composed script");
            Ok(fallback)
        }
    }
}
