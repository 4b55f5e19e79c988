//! Interfaces of the external services the pipeline drives.
//!
//! The orchestrator only sees these traits. Concrete HTTP clients live in
//! [`http`] behind the `http` feature; tests plug in deterministic fakes.

#[cfg(feature = "http")]
pub mod http;

use crate::audio::PcmBuffer;
use crate::config::{PipelineConfig, VoiceProfile, IMAGE_API_KEY_VAR, LLM_API_KEY_VAR, SEARCH_API_KEY_VAR, SPEECH_API_KEY_VAR};
use crate::errors::{PipelineError, SynthesisError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Snippet or extracted content.
    pub content: String,
    /// Relevance score reported by the service.
    #[serde(default)]
    pub score: Option<f64>,
}

impl SearchHit {
    /// Creates a hit without a score.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score: None,
        }
    }
}

/// A single text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    /// Creates a request with the default temperature.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
        }
    }

    /// Sets the system instruction.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A single image-rendering call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// What to draw.
    pub prompt: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Ranked web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns up to `max_results` hits for `query`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, PipelineError>;
}

/// Chat-style text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the generated text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError>;
}

/// Image rendering.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the encoded image bytes.
    async fn render(&self, request: &ImageRequest) -> Result<Vec<u8>, PipelineError>;
}

/// Text-to-speech.
///
/// Implementations may return audio at any sample rate; the adapter
/// resamples it.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Speaks `text` in `voice`.
    async fn synthesize(&self, voice: &VoiceProfile, text: &str) -> Result<PcmBuffer, SynthesisError>;
}

/// The set of external services available to a run.
///
/// An empty slot means the matching credential is missing; stages needing it
/// are skipped.
#[derive(Clone, Default)]
pub struct Collaborators {
    /// Search service.
    pub search: Option<Arc<dyn SearchProvider>>,
    /// Text generation service.
    pub text: Option<Arc<dyn TextGenerator>>,
    /// Image rendering service.
    pub image: Option<Arc<dyn ImageGenerator>>,
    /// Speech synthesis service.
    pub speech: Option<Arc<dyn SpeechBackend>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("has_search", &self.search.is_some())
            .field("has_text", &self.text.is_some())
            .field("has_image", &self.image.is_some())
            .field("has_speech", &self.speech.is_some())
            .finish()
    }
}

impl Collaborators {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds HTTP clients for every service whose credential is set.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    #[cfg(feature = "http")]
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let creds = &config.credentials;
        let endpoints = &config.endpoints;
        let mut set = Self::new();

        if let Some(key) = &creds.search_api_key {
            set.search = Some(Arc::new(http::TavilySearch::new(endpoints, key)?));
        }
        if let Some(key) = &creds.llm_api_key {
            set.text = Some(Arc::new(http::ChatCompletions::new(endpoints, key)?));
        }
        if let Some(key) = &creds.image_api_key {
            set.image = Some(Arc::new(http::ImageGenerations::new(endpoints, key)?));
        }
        if let Some(key) = &creds.speech_api_key {
            set.speech = Some(Arc::new(http::SpeechEndpoint::new(
                endpoints,
                key,
                config.synthesis.timeout(),
            )?));
        }
        Ok(set)
    }

    /// Sets the search service.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Sets the text generation service.
    #[must_use]
    pub fn with_text(mut self, text: Arc<dyn TextGenerator>) -> Self {
        self.text = Some(text);
        self
    }

    /// Sets the image service.
    #[must_use]
    pub fn with_image(mut self, image: Arc<dyn ImageGenerator>) -> Self {
        self.image = Some(image);
        self
    }

    /// Sets the speech service.
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechBackend>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Gets the search service or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing credential.
    pub fn require_search(&self) -> Result<Arc<dyn SearchProvider>, PipelineError> {
        self.search.clone().ok_or_else(|| missing(SEARCH_API_KEY_VAR))
    }

    /// Gets the text generation service or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing credential.
    pub fn require_text(&self) -> Result<Arc<dyn TextGenerator>, PipelineError> {
        self.text.clone().ok_or_else(|| missing(LLM_API_KEY_VAR))
    }

    /// Gets the image service or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing credential.
    pub fn require_image(&self) -> Result<Arc<dyn ImageGenerator>, PipelineError> {
        self.image.clone().ok_or_else(|| missing(IMAGE_API_KEY_VAR))
    }

    /// Gets the speech service or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing credential.
    pub fn require_speech(&self) -> Result<Arc<dyn SpeechBackend>, PipelineError> {
        self.speech.clone().ok_or_else(|| missing(SPEECH_API_KEY_VAR))
    }
}

fn missing(var: &str) -> PipelineError {
    PipelineError::configuration(format!("{var} is not set"))
}
