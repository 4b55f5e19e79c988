//! Drives a run from topic to artifacts.
//!
//! Search and Article run in sequence. After that the Script then Audio
//! branch and the Image stage run concurrently. Every stage body runs under
//! the run's cancellation token, and every external call inside it goes
//! through the retry policy.

use crate::article::{cover_prompt, ArticleWriter};
use crate::audio::{codec, AudioAssembler, PcmBuffer, SpeechSynthesisAdapter};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{ArtifactKind, DialogueTurn, PendingArtifact, Stage};
use crate::errors::{ErrorKind, PipelineError};
use crate::events::EventSink;
use crate::pipeline::retry::with_retry;
use crate::pipeline::run::{PipelineRun, RunResult};
use crate::providers::{Collaborators, ImageRequest, SearchHit};
use crate::script::{compose_dialogue, ScriptComposer};
use futures::{StreamExt, TryFutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

type StageBody<T> = Result<(T, Vec<PendingArtifact>), PipelineError>;

/// Runs the topic pipeline.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    collaborators: Collaborators,
    sinks: Vec<Arc<dyn EventSink>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("output_root", &self.config.output_root)
            .field("collaborators", &self.collaborators)
            .field("sinks", &self.sinks.len())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            sinks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Adds an event sink next to the run log.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Uses `token` for cancellation instead of a private one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle that aborts the current and every later run when cancelled.
    ///
    /// Each run gets a child of this token, so a run timeout ends only its
    /// own run.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage for `topic`.
    ///
    /// Stage failures are recorded in the result, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run directory or its log cannot be
    /// created.
    pub async fn run(&self, topic: &str) -> Result<RunResult, PipelineError> {
        let run = PipelineRun::create(&self.config.output_root, topic, self.sinks.clone())?
            .with_cancellation(self.cancel.child_token());
        let timer = self.config.run_timeout().map(|t| run.cancellation().cancel_after(t));
        info!(run_id = %run.id(), dir = %run.dir().display(), "Pipeline run started");

        let topic = topic.trim();
        let hits = self.execute(&run, Stage::Search, self.search(topic)).await;
        let article = match &hits {
            Some(hits) => self.execute(&run, Stage::Article, self.article(topic, hits)).await,
            None => self.settle_blocked(&run, Stage::Article),
        };

        match (&hits, &article) {
            (Some(hits), Some(article)) => {
                tokio::join!(
                    self.script_then_audio(&run, article),
                    self.execute(&run, Stage::Image, self.cover(topic, hits, article)),
                );
            }
            _ => {
                for stage in [Stage::Script, Stage::Audio, Stage::Image] {
                    self.settle_blocked::<()>(&run, stage);
                }
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        let result = run.finish();
        info!(
            run_id = %result.run_id,
            success = result.is_success(),
            failures = result.failures.len(),
            "Pipeline run finished"
        );
        Ok(result)
    }

    /// Starts `stage`, runs `body` and records the outcome.
    ///
    /// Configuration errors skip the stage, every other error fails it.
    async fn execute<T, F>(&self, run: &PipelineRun, stage: Stage, body: F) -> Option<T>
    where
        F: Future<Output = StageBody<T>>,
    {
        match run.begin(stage) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                error!(%stage, error = %e, "Could not start stage");
                return None;
            }
        }

        let started = Instant::now();
        let outcome = run.cancellation().guard(body).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let recorded = match outcome {
            Ok((value, artifacts)) => match run.complete(stage, artifacts) {
                Ok(published) => {
                    info!(%stage, elapsed_ms, artifacts = published.len(), "Stage succeeded");
                    return Some(value);
                }
                Err(e) => {
                    error!(%stage, error = %e, "Publishing artifacts failed");
                    return None;
                }
            },
            Err(e) if e.kind() == ErrorKind::Configuration => {
                warn!(%stage, reason = %e, "Stage skipped");
                run.skip(stage, e.to_string())
            }
            Err(e) => {
                if e.kind() == ErrorKind::Assembly {
                    error!(%stage, elapsed_ms, error = %e, "Audio timeline inconsistent");
                } else {
                    warn!(%stage, elapsed_ms, kind = %e.kind(), error = %e, "Stage failed");
                }
                run.fail(stage, &e)
            }
        };
        if let Err(e) = recorded {
            error!(%stage, error = %e, "Could not record stage outcome");
        }
        None
    }

    /// Marks a stage whose prerequisite did not succeed as skipped.
    fn settle_blocked<T>(&self, run: &PipelineRun, stage: Stage) -> Option<T> {
        match run.begin(stage) {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = run.fail(stage, &PipelineError::Internal("stage has no input".to_string())) {
                    error!(%stage, error = %e, "Could not record stage outcome");
                }
            }
            Err(e) => error!(%stage, error = %e, "Could not settle stage"),
        }
        None
    }

    async fn script_then_audio(&self, run: &PipelineRun, article: &str) {
        match self.execute(run, Stage::Script, self.script(article)).await {
            Some(turns) => {
                self.execute(run, Stage::Audio, self.audio(&turns)).await;
            }
            None => {
                self.settle_blocked::<()>(run, Stage::Audio);
            }
        }
    }

    async fn search(&self, topic: &str) -> StageBody<Vec<SearchHit>> {
        if topic.is_empty() {
            return Err(PipelineError::content("topic is empty"));
        }
        let provider = self.collaborators.require_search()?;
        let max_results = self.config.search.max_results;

        let hits = with_retry(&self.config.retry, "search", || provider.search(topic, max_results)).await?;
        if hits.is_empty() {
            return Err(PipelineError::content(format!("search returned no results for {topic:?}")));
        }
        info!(hits = hits.len(), "Search results received");
        Ok((hits, Vec::new()))
    }

    async fn article(&self, topic: &str, hits: &[SearchHit]) -> StageBody<String> {
        let generator = self.collaborators.require_text()?;
        let writer = ArticleWriter::new(self.config.article.clone(), self.config.search.max_snippet_chars);

        let article = writer.write(&*generator, &self.config.retry, topic, hits).await?;
        info!(chars = article.chars().count(), "Article written");

        let file = PendingArtifact::new(ArtifactKind::Article, format!("{article}\n").into_bytes());
        Ok((article, vec![file]))
    }

    async fn script(&self, article: &str) -> StageBody<Vec<DialogueTurn>> {
        let composer = ScriptComposer::new(self.config.script_config());
        let turns = compose_dialogue(
            &composer,
            self.collaborators.text.as_deref(),
            &self.config.retry,
            article,
        )
        .await?;
        info!(turns = turns.len(), "Dialogue composed");

        let json = serde_json::to_vec_pretty(&turns)?;
        let mut text = turns
            .iter()
            .map(DialogueTurn::to_script_line)
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');

        let files = vec![
            PendingArtifact::new(ArtifactKind::Script, json),
            PendingArtifact::new(ArtifactKind::ScriptText, text.into_bytes()),
        ];
        Ok((turns, files))
    }

    /// Synthesizes every turn on a bounded pool and mixes the podcast.
    ///
    /// Segments are placed as they arrive; the first failed turn fails the
    /// stage and drops the calls still in flight.
    async fn audio(&self, turns: &[DialogueTurn]) -> StageBody<()> {
        let backend = self.collaborators.require_speech()?;
        let mix = self.config.mix.clone();
        let concurrency = self.config.synthesis.concurrency.max(1);
        let adapter = SpeechSynthesisAdapter::new(backend, self.config.synthesis.clone(), mix.sample_rate);
        let assembler = AudioAssembler::new(mix.clone());
        let mut timeline = assembler.timeline(turns.len())?;
        let retry = &self.config.retry;

        let background = self.load_background().await;

        {
            let adapter = &adapter;
            let mut segments = futures::stream::iter(turns)
                .map(|turn| with_retry(retry, "speech", move || adapter.synthesize_turn(turn)))
                .buffer_unordered(concurrency);

            while let Some(segment) = segments.next().await {
                let segment = segment?;
                debug!(
                    turn = segment.turn_index,
                    duration_ms = segment.duration().as_millis() as u64,
                    "Turn synthesized"
                );
                timeline.push(segment)?;
            }
        }
        let speech = timeline.finish()?;

        let format = mix.format;
        let bitrate = mix.mp3_bitrate_kbps;
        let encoded = tokio::task::spawn_blocking(move || {
            let track = assembler.mix(speech, background.as_ref());
            info!(
                turns = track.placements.len(),
                duration_secs = track.duration().as_secs_f64(),
                speech_peak = track.speech_peak,
                background_peak = track.background_peak,
                "Podcast mixed"
            );
            codec::encode(&PcmBuffer::new(track.samples, track.sample_rate), format, bitrate)
        })
        .map_err(|e| PipelineError::Internal(format!("mixing task failed: {e}")))
        .await??;

        let file = PendingArtifact::new(ArtifactKind::Podcast, encoded).with_file_name(format.file_name());
        Ok(((), vec![file]))
    }

    /// Decodes the configured background track, if any.
    ///
    /// An unreadable track is logged and the podcast is mixed without it.
    async fn load_background(&self) -> Option<PcmBuffer> {
        let path = self.config.mix.background_path.clone()?;
        let shown = path.display().to_string();
        if !path.is_file() {
            warn!(path = %shown, "Background music not found, mixing speech only");
            return None;
        }

        match tokio::task::spawn_blocking(move || codec::decode_file(&path)).await {
            Ok(Ok(pcm)) => {
                debug!(path = %shown, duration_secs = pcm.duration().as_secs_f64(), "Background music loaded");
                Some(pcm)
            }
            Ok(Err(e)) => {
                warn!(path = %shown, error = %e, "Background music unreadable, mixing speech only");
                None
            }
            Err(e) => {
                warn!(path = %shown, error = %e, "Background decoding task failed");
                None
            }
        }
    }

    async fn cover(&self, topic: &str, hits: &[SearchHit], article: &str) -> StageBody<()> {
        let renderer = self.collaborators.require_image()?;
        let retry = &self.config.retry;

        let prompt = cover_prompt(self.collaborators.text.as_deref(), retry, topic, hits, article).await?;
        debug!(prompt = %prompt, "Cover prompt ready");

        let request = ImageRequest {
            prompt,
            width: self.config.image.width,
            height: self.config.image.height,
        };
        let bytes = with_retry(retry, "image", || renderer.render(&request)).await?;
        if bytes.is_empty() {
            return Err(PipelineError::content("image service returned an empty file"));
        }
        info!(bytes = bytes.len(), "Cover rendered");
        Ok(((), vec![PendingArtifact::new(ArtifactKind::Cover, bytes)]))
    }
}
