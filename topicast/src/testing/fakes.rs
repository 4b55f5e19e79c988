//! Deterministic stand-ins for the external services.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::PcmBuffer;
use crate::config::VoiceProfile;
use crate::errors::{PipelineError, SynthesisError};
use crate::providers::{
    GenerationRequest, ImageGenerator, ImageRequest, SearchHit, SearchProvider, SpeechBackend,
    TextGenerator,
};

type TextHandler = dyn Fn(&GenerationRequest) -> Result<String, PipelineError> + Send + Sync;

/// A search service returning fixed hits.
#[derive(Debug, Default)]
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    /// Creates a search returning `hits` for every query.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Creates a search returning three plausible hits.
    #[must_use]
    pub fn sample() -> Self {
        Self::new(vec![
            SearchHit::new(
                "Open model tops reasoning benchmarks",
                "https://news.example/model",
                "A new open-weight model matched proprietary systems on math and code.",
            ),
            SearchHit::new(
                "Training cost questioned",
                "https://news.example/cost",
                "Analysts debate the reported training budget of the model.",
            ),
            SearchHit::new(
                "Cloud providers add support",
                "https://news.example/cloud",
                "Major clouds now host the model for inference.",
            ),
        ])
    }

    /// Queries received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, PipelineError> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// A text generator driven by a handler function.
pub struct ScriptedText {
    handler: Box<TextHandler>,
    calls: Mutex<usize>,
}

impl std::fmt::Debug for ScriptedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedText")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl ScriptedText {
    /// Creates a generator answering every request with `handler`.
    #[must_use]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, PipelineError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(0),
        }
    }

    /// Creates a generator that always replies with `reply`.
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Creates a generator that writes a long article for any prompt and
    /// answers script requests with text that is not JSON.
    ///
    /// Scripts therefore come from the heuristic composer, which keeps
    /// pipeline tests independent of reply parsing.
    #[must_use]
    pub fn writer() -> Self {
        Self::new(|_| Ok(sample_article()))
    }

    /// Number of requests served.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        *self.calls.lock() += 1;
        (self.handler)(request)
    }
}

/// A long markdown article usable by every stage.
#[must_use]
pub fn sample_article() -> String {
    "# The open model moment\n\n\
     A new open-weight model matched proprietary systems on math and code benchmarks. \
     Its developers reported a training budget far below industry norms. \
     Analysts are still debating how that figure was calculated. \
     The weights were released under a permissive license. \
     Within days, researchers had fine-tuned variants for programming tasks. \
     Major cloud providers added the model to their catalogues. \
     Inference prices across the market dropped in response. \
     Critics note that benchmark selection can flatter any model. \
     Still, the release shifted expectations about what small teams can build."
        .to_string()
}

/// A speech service producing a constant tone whose length follows the text.
#[derive(Debug)]
pub struct ToneSpeech {
    sample_rate: u32,
    samples_per_char: usize,
    amplitude: f32,
    failures: Mutex<usize>,
    retryable_failures: bool,
    stagger: bool,
    calls: Mutex<Vec<String>>,
}

impl ToneSpeech {
    /// Creates a speech service at `sample_rate`.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples_per_char: 10,
            amplitude: 0.5,
            failures: Mutex::new(0),
            retryable_failures: true,
            stagger: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first `count` calls.
    #[must_use]
    pub fn with_failures(mut self, count: usize, retryable: bool) -> Self {
        self.failures = Mutex::new(count);
        self.retryable_failures = retryable;
        self
    }

    /// Delays short texts longer than long ones, so completion order differs
    /// from request order.
    #[must_use]
    pub fn with_stagger(mut self) -> Self {
        self.stagger = true;
        self
    }

    /// Number of calls received, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Texts received, in call order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SpeechBackend for ToneSpeech {
    async fn synthesize(&self, _voice: &VoiceProfile, text: &str) -> Result<PcmBuffer, SynthesisError> {
        self.calls.lock().push(text.to_string());

        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(if self.retryable_failures {
                    SynthesisError::transient("HTTP 503: busy")
                } else {
                    SynthesisError::permanent("HTTP 400: unknown voice")
                });
            }
        }

        let chars = text.chars().count();
        if self.stagger {
            let delay = 40_u64.saturating_sub(chars as u64 % 40);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(PcmBuffer::new(
            vec![self.amplitude; chars * self.samples_per_char],
            self.sample_rate,
        ))
    }
}

/// An image service returning fixed bytes or failing.
#[derive(Debug)]
pub struct StaticImage {
    bytes: Option<Vec<u8>>,
    calls: Mutex<usize>,
}

impl StaticImage {
    /// Creates a service returning `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            calls: Mutex::new(0),
        }
    }

    /// Creates a service rejecting every request permanently.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            bytes: None,
            calls: Mutex::new(0),
        }
    }

    /// Number of requests served.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ImageGenerator for StaticImage {
    async fn render(&self, _request: &ImageRequest) -> Result<Vec<u8>, PipelineError> {
        *self.calls.lock() += 1;
        self.bytes
            .clone()
            .ok_or_else(|| PipelineError::service("image", "HTTP 400: content policy violation"))
    }
}

/// Fakes for all four services wired together.
#[derive(Debug, Clone)]
pub struct FakeServices {
    /// Search.
    pub search: Arc<StaticSearch>,
    /// Text generation.
    pub text: Arc<ScriptedText>,
    /// Image rendering.
    pub image: Arc<StaticImage>,
    /// Speech.
    pub speech: Arc<ToneSpeech>,
}

impl FakeServices {
    /// Creates services that all succeed, with speech at `sample_rate`.
    #[must_use]
    pub fn healthy(sample_rate: u32) -> Self {
        Self {
            search: Arc::new(StaticSearch::sample()),
            text: Arc::new(ScriptedText::writer()),
            image: Arc::new(StaticImage::new(vec![0xFF, 0xD8, 0xFF, 0xD9])),
            speech: Arc::new(ToneSpeech::new(sample_rate)),
        }
    }

    /// Converts to a collaborator set.
    #[must_use]
    pub fn collaborators(&self) -> crate::providers::Collaborators {
        crate::providers::Collaborators::new()
            .with_search(self.search.clone())
            .with_text(self.text.clone())
            .with_image(self.image.clone())
            .with_speech(self.speech.clone())
    }
}
