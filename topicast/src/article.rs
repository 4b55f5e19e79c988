//! Article writing and cover-prompt derivation.
//!
//! The article is produced in three generator calls: an outline, an edited
//! outline and the full text. Each call goes through the retry policy on
//! its own, so a transient failure in the last step does not redo the first.

use crate::config::ArticleConfig;
use crate::errors::{ErrorKind, PipelineError};
use crate::pipeline::{with_retry, RetryConfig};
use crate::providers::{GenerationRequest, SearchHit, TextGenerator};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

const OUTLINE_SYSTEM: &str = "You are a rigorous article architect.";
const EDITOR_SYSTEM: &str = "You are a demanding senior technology editor.";
const WRITER_SYSTEM: &str = "You are a technology columnist with an excellent prose style.";
const COVER_SYSTEM: &str = "You write concise prompts for text-to-image models.";

/// Characters of the article opening handed to the cover prompt.
const COVER_CONTEXT_CHARS: usize = 500;

/// Formats search hits as numbered research notes.
///
/// Each snippet is capped at `max_snippet_chars` characters.
#[must_use]
pub fn research_notes(hits: &[SearchHit], max_snippet_chars: usize) -> String {
    let mut notes = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = hit.content.chars().take(max_snippet_chars).collect();
        let _ = write!(
            notes,
            "[Source {}] {}\n{}\nURL: {}\n\n",
            i + 1,
            hit.title,
            snippet.trim(),
            hit.url
        );
    }
    notes
}

fn outline_prompt(topic: &str, notes: &str) -> String {
    format!(
        "Plan a detailed outline for an in-depth technology article about \"{topic}\".\n\n\
         Research notes:\n{notes}\n\
         Requirements:\n\
         1. Propose three catchy candidate titles.\n\
         2. Structure: introduction, three to five core sections with one clear point each, conclusion.\n\
         3. Look for the trend or industry impact behind the news instead of restating it.\n\
         4. Audience: technology enthusiasts and practitioners.\n\n\
         Reply with the outline only."
    )
}

fn refine_prompt(outline: &str) -> String {
    format!(
        "As a senior editor, improve the article outline below.\n\n\
         Current outline:\n{outline}\n\n\
         Requirements:\n\
         1. Check that the argument flows logically.\n\
         2. Sharpen any point that reads like a cliche.\n\
         3. Where a section is thin, add background or a forecast.\n\
         4. Reply with the final outline only."
    )
}

fn article_prompt(outline: &str, notes: &str) -> String {
    format!(
        "Write the complete article following the outline and research notes below.\n\n\
         Outline:\n{outline}\n\n\
         Research notes:\n{notes}\n\
         Requirements:\n\
         1. Follow the outline structure and pick its best title.\n\
         2. Professional and objective, but warm.\n\
         3. Around 1500 words.\n\
         4. Markdown, with key points in bold.\n\n\
         Start writing directly."
    )
}

/// Writes articles from search results with a text generator.
#[derive(Debug, Clone)]
pub struct ArticleWriter {
    config: ArticleConfig,
    max_snippet_chars: usize,
}

impl ArticleWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new(config: ArticleConfig, max_snippet_chars: usize) -> Self {
        Self {
            config,
            max_snippet_chars,
        }
    }

    /// Runs the outline, edit and write chain.
    ///
    /// # Errors
    ///
    /// Returns the last generator error once its retry budget is spent, or a
    /// content error if the article is shorter than the configured minimum.
    pub async fn write(
        &self,
        generator: &dyn TextGenerator,
        retry: &RetryConfig,
        topic: &str,
        hits: &[SearchHit],
    ) -> Result<String, PipelineError> {
        let notes = research_notes(hits, self.max_snippet_chars);
        debug!(chars = notes.chars().count(), "Research notes prepared");

        let request = GenerationRequest::new(outline_prompt(topic, &notes)).with_system(OUTLINE_SYSTEM);
        let mut outline = with_retry(retry, "article.outline", || generator.generate(&request)).await?;
        info!(chars = outline.chars().count(), "Outline drafted");

        if self.config.refine_outline {
            let request = GenerationRequest::new(refine_prompt(&outline)).with_system(EDITOR_SYSTEM);
            outline = with_retry(retry, "article.refine", || generator.generate(&request)).await?;
            info!(chars = outline.chars().count(), "Outline refined");
        }

        let request = GenerationRequest::new(article_prompt(&outline, &notes)).with_system(WRITER_SYSTEM);
        let article = with_retry(retry, "article.write", || generator.generate(&request)).await?;
        self.validate(article)
    }

    /// Trims the article and enforces the minimum length.
    ///
    /// # Errors
    ///
    /// Returns a content error for a short article.
    pub fn validate(&self, article: String) -> Result<String, PipelineError> {
        let article = article.trim().to_string();
        let chars = article.chars().count();
        if chars < self.config.min_chars {
            return Err(PipelineError::content(format!(
                "article has {chars} characters, fewer than the minimum of {}",
                self.config.min_chars
            )));
        }
        Ok(article)
    }
}

/// A cover prompt used when no generator is available or it fails.
#[must_use]
pub fn fallback_cover_prompt(topic: &str) -> String {
    format!(
        "Editorial cover illustration about {topic}, futuristic technology theme, \
         clean composition, cinematic lighting, no text, 16:9"
    )
}

fn cover_request(title: &str, article: &str) -> GenerationRequest {
    let opening: String = article.chars().take(COVER_CONTEXT_CHARS).collect();
    GenerationRequest::new(format!(
        "Write one English prompt for a text-to-image model to create the cover of \
         an article titled \"{title}\".\n\n\
         Article opening:\n{opening}\n\n\
         Describe a single striking scene, style and lighting. No text in the image. \
         Reply with the prompt only."
    ))
    .with_system(COVER_SYSTEM)
    .with_temperature(0.9)
}

/// Derives the cover-image prompt from the first hit's title and the
/// article opening.
///
/// Generator failures other than cancellation fall back to
/// [`fallback_cover_prompt`].
///
/// # Errors
///
/// Returns a cancellation error if the run is aborted meanwhile.
pub async fn cover_prompt(
    generator: Option<&dyn TextGenerator>,
    retry: &RetryConfig,
    topic: &str,
    hits: &[SearchHit],
    article: &str,
) -> Result<String, PipelineError> {
    let Some(generator) = generator else {
        return Ok(fallback_cover_prompt(topic));
    };
    let title = hits.first().map_or(topic, |hit| hit.title.as_str());
    let request = cover_request(title, article);

    match with_retry(retry, "image.prompt", || generator.generate(&request)).await {
        Ok(prompt) if !prompt.trim().is_empty() => Ok(prompt.trim().to_string()),
        Ok(_) => Ok(fallback_cover_prompt(topic)),
        Err(e) if e.kind() == ErrorKind::Cancelled => Err(e),
        Err(e) => {
            warn!(error = %e, "Cover prompt generation failed, using fallback");
            Ok(fallback_cover_prompt(topic))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::{sample_article, ScriptedText};
    use pretty_assertions::assert_eq;

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit::new("Model tops benchmark", "https://a.example", "x".repeat(2000)),
            SearchHit::new("Prices fall", "https://b.example", "Cheaper inference."),
        ]
    }

    #[test]
    fn test_research_notes_cap_snippets() {
        let notes = research_notes(&hits(), 800);

        assert!(notes.starts_with("[Source 1] Model tops benchmark\n"));
        assert!(notes.contains("[Source 2] Prices fall"));
        assert!(!notes.contains(&"x".repeat(801)));
        assert!(notes.contains(&"x".repeat(800)));
    }

    #[tokio::test]
    async fn test_chain_makes_three_calls() {
        let generator = ScriptedText::writer();
        let writer = ArticleWriter::new(ArticleConfig::default(), 800);

        let article = writer
            .write(&generator, &RetryConfig::immediate(1), "open models", &hits())
            .await
            .unwrap();

        assert_eq!(article, sample_article().trim());
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_refine_step_is_optional() {
        let generator = ScriptedText::writer();
        let config = ArticleConfig {
            refine_outline: false,
            ..ArticleConfig::default()
        };
        let writer = ArticleWriter::new(config, 800);

        writer
            .write(&generator, &RetryConfig::immediate(1), "open models", &hits())
            .await
            .unwrap();
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_short_article_is_content_error() {
        let generator = ScriptedText::always("Too short.");
        let writer = ArticleWriter::new(ArticleConfig::default(), 800);

        let err = writer
            .write(&generator, &RetryConfig::immediate(1), "open models", &hits())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Content);
    }

    #[tokio::test]
    async fn test_cover_prompt_uses_first_title() {
        let generator = ScriptedText::new(|request| {
            assert!(request.prompt.contains("\"Model tops benchmark\""));
            Ok("  A glowing chip over a city skyline  ".to_string())
        });

        let prompt = cover_prompt(
            Some(&generator),
            &RetryConfig::immediate(1),
            "open models",
            &hits(),
            &sample_article(),
        )
        .await
        .unwrap();
        assert_eq!(prompt, "A glowing chip over a city skyline");
    }

    #[tokio::test]
    async fn test_cover_prompt_falls_back() {
        let generator = ScriptedText::new(|_| Err(PipelineError::service("llm", "HTTP 401")));

        let prompt = cover_prompt(Some(&generator), &RetryConfig::immediate(1), "open models", &[], "text")
            .await
            .unwrap();
        assert_eq!(prompt, fallback_cover_prompt("open models"));

        let prompt = cover_prompt(None, &RetryConfig::immediate(1), "open models", &[], "text")
            .await
            .unwrap();
        assert!(prompt.contains("open models"));
    }
}
