//! HTTP clients for the hosted services.
//!
//! Every client maps transport failures and 408/429/5xx responses to
//! transient errors so the retry layer can take another attempt; any other
//! non-success status is permanent.

use super::{GenerationRequest, ImageGenerator, ImageRequest, SearchHit, SearchProvider, SpeechBackend, TextGenerator};
use crate::audio::{codec, PcmBuffer};
use crate::config::{Endpoints, VoiceProfile};
use crate::errors::{PipelineError, Retryable, SynthesisError};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

fn build_client(timeout: Duration) -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Internal(format!("Failed to create HTTP client: {e}")))
}

async fn send(service: &str, request: RequestBuilder) -> Result<Response, PipelineError> {
    let response = request
        .send()
        .await
        .map_err(|e| PipelineError::transient(service, e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::from_status(service, status.as_u16(), &body))
}

/// Tavily search API.
#[derive(Clone)]
pub struct TavilySearch {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

impl TavilySearch {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: &Endpoints, api_key: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(endpoints.request_timeout())?,
            url: endpoints.search_url.clone(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, PipelineError> {
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "advanced",
            "max_results": max_results,
        });
        let response = send("search", self.client.post(&self.url).json(&body)).await?;
        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("search", format!("invalid response: {e}")))?;

        debug!(hits = parsed.results.len(), "Search returned");
        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
            })
            .collect())
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatCompletions {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletions {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: &Endpoints, api_key: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(endpoints.request_timeout())?,
            url: format!("{}/chat/completions", endpoints.llm_base_url.trim_end_matches('/')),
            model: endpoints.llm_model.clone(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletions {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        let response = send(
            "llm",
            self.client.post(&self.url).bearer_auth(&self.api_key).json(&body),
        )
        .await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("llm", format!("invalid response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PipelineError::content("text generator returned no content"))
    }
}

/// Image generation endpoint returning a URL or base64 payload.
#[derive(Clone)]
pub struct ImageGenerations {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
    #[serde(default)]
    images: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

impl ImageGenerations {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: &Endpoints, api_key: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(endpoints.request_timeout())?,
            url: endpoints.image_url.clone(),
            model: endpoints.image_model.clone(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ImageGenerator for ImageGenerations {
    async fn render(&self, request: &ImageRequest) -> Result<Vec<u8>, PipelineError> {
        let body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "image_size": format!("{}x{}", request.width, request.height),
            "batch_size": 1,
        });
        let response = send(
            "image",
            self.client.post(&self.url).bearer_auth(&self.api_key).json(&body),
        )
        .await?;
        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("image", format!("invalid response: {e}")))?;

        let datum = parsed
            .data
            .into_iter()
            .chain(parsed.images)
            .next()
            .ok_or_else(|| PipelineError::service("image", "response contained no image"))?;

        if let Some(encoded) = datum.b64_json {
            return base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| PipelineError::service("image", format!("invalid base64: {e}")));
        }
        let url = datum
            .url
            .ok_or_else(|| PipelineError::service("image", "image has neither url nor data"))?;
        let download = send("image", self.client.get(&url)).await?;
        let bytes = download
            .bytes()
            .await
            .map_err(|e| PipelineError::transient("image", e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// OpenAI-compatible `audio/speech` endpoint.
#[derive(Clone)]
pub struct SpeechEndpoint {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl SpeechEndpoint {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: &Endpoints, api_key: &str, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{}/audio/speech", endpoints.speech_base_url.trim_end_matches('/')),
            model: endpoints.speech_model.clone(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SpeechBackend for SpeechEndpoint {
    async fn synthesize(&self, voice: &VoiceProfile, text: &str) -> Result<PcmBuffer, SynthesisError> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": voice.name,
            "response_format": "wav",
        });
        let response = send(
            "speech",
            self.client.post(&self.url).bearer_auth(&self.api_key).json(&body),
        )
        .await
        .map_err(|e| {
            if e.is_retryable() {
                SynthesisError::transient(e.to_string())
            } else {
                SynthesisError::permanent(e.to_string())
            }
        })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::transient(e.to_string()))?;

        codec::decode_bytes(bytes.to_vec(), Some("wav")).map_err(|e| SynthesisError::Decode(e.to_string()))
    }
}
