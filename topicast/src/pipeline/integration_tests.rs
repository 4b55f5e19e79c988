//! End-to-end runs against in-process fakes.

#[cfg(test)]
mod tests {
    use crate::audio::{codec, db_to_linear, AudioAssembler, AudioSegment, PcmBuffer};
    use crate::cancellation::CancellationToken;
    use crate::config::{AudioFormat, MixConfig, PipelineConfig, VoiceProfile};
    use crate::core::{ArtifactKind, DialogueTurn, Speaker, Stage, StageStatus};
    use crate::errors::{AssemblyError, ErrorKind, SynthesisError};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{PipelineOrchestrator, RetryConfig, RunResult};
    use crate::providers::{Collaborators, SpeechBackend};
    use crate::testing::fakes::{sample_article, FakeServices, ScriptedText, StaticImage, ToneSpeech};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const RATE: u32 = 8_000;

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig::new()
            .with_output_root(root)
            .with_retry(RetryConfig::immediate(3))
            .with_mix(MixConfig {
                sample_rate: RATE,
                format: AudioFormat::Wav,
                ..MixConfig::default()
            })
    }

    fn services_with_speech(speech: ToneSpeech) -> (FakeServices, Collaborators) {
        let mut services = FakeServices::healthy(RATE);
        services.speech = Arc::new(speech);
        let collaborators = services.collaborators();
        (services, collaborators)
    }

    fn failure_kind(result: &RunResult, stage: Stage) -> Option<ErrorKind> {
        match result.status(stage) {
            StageStatus::Failed(failure) => Some(failure.kind),
            _ => None,
        }
    }

    fn read_turns(result: &RunResult) -> Vec<DialogueTurn> {
        let path = result.artifact(ArtifactKind::Script).unwrap();
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    fn staged_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".partial"))
            .collect()
    }

    #[tokio::test]
    async fn test_image_failure_leaves_other_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let mut services = FakeServices::healthy(RATE);
        services.image = Arc::new(StaticImage::rejecting());
        let orchestrator = PipelineOrchestrator::new(config(root.path()), services.collaborators());

        let result = orchestrator.run("open models").await.unwrap();

        assert!(result.is_success());
        assert_eq!(failure_kind(&result, Stage::Image), Some(ErrorKind::Service));
        assert_eq!(services.image.calls(), 1);
        for stage in [Stage::Search, Stage::Article, Stage::Script, Stage::Audio] {
            assert_eq!(result.status(stage), StageStatus::Succeeded, "{stage}");
        }

        let dir = &result.run_dir;
        for name in ["article.md", "script.json", "script.txt", "podcast.wav", "pipeline.log", "manifest.json"] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        assert!(!dir.join("cover.jpg").exists());
        assert!(result.artifact(ArtifactKind::Cover).is_none());

        let log = std::fs::read_to_string(dir.join("pipeline.log")).unwrap();
        assert!(log.contains("[image] failed"));
        assert!(log.contains("[audio] succeeded"));
    }

    #[tokio::test]
    async fn test_podcast_length_follows_turns() {
        let root = tempfile::tempdir().unwrap();
        let services = FakeServices::healthy(RATE);
        let orchestrator = PipelineOrchestrator::new(config(root.path()), services.collaborators());

        let result = orchestrator.run("open models").await.unwrap();
        assert!(result.artifact(ArtifactKind::Cover).is_some());

        let turns = read_turns(&result);
        assert_eq!(services.speech.call_count(), turns.len());
        let mix = &orchestrator.config().mix;
        let speech: usize = turns.iter().map(|t| t.text.chars().count() * 10).sum();
        let expected = mix.samples_for_ms(mix.lead_in_ms)
            + speech
            + (turns.len() - 1) * mix.samples_for_ms(mix.gap_ms)
            + mix.samples_for_ms(mix.tail_ms);

        let podcast = codec::decode_file(result.artifact(ArtifactKind::Podcast).unwrap()).unwrap();
        assert_eq!(podcast.sample_rate, RATE);
        assert_eq!(podcast.len(), expected);

        let script = std::fs::read_to_string(result.run_dir.join("script.txt")).unwrap();
        assert!(script.starts_with("[Host]: "));
        assert_eq!(script.lines().count(), turns.len());
    }

    #[tokio::test]
    async fn test_turns_stay_ordered_when_synthesis_finishes_out_of_order() {
        let root = tempfile::tempdir().unwrap();
        let (_services, collaborators) = services_with_speech(ToneSpeech::new(RATE).with_stagger());
        let orchestrator = PipelineOrchestrator::new(config(root.path()), collaborators);

        let result = orchestrator.run("open models").await.unwrap();
        assert_eq!(result.status(Stage::Audio), StageStatus::Succeeded);

        let turns = read_turns(&result);
        let podcast = codec::decode_file(result.artifact(ArtifactKind::Podcast).unwrap()).unwrap();
        let mix = &orchestrator.config().mix;
        let gap = mix.samples_for_ms(mix.gap_ms);
        let guest = 0.5 * db_to_linear(2.0);

        let mut cursor = mix.samples_for_ms(mix.lead_in_ms);
        for turn in &turns {
            let len = turn.text.chars().count() * 10;
            let amplitude = match turn.speaker {
                Speaker::Host => 0.5,
                Speaker::Guest => guest,
            };
            assert!((podcast.samples[cursor] - amplitude).abs() < 1e-3, "turn {}", turn.index);
            assert!((podcast.samples[cursor + len - 1] - amplitude).abs() < 1e-3, "turn {}", turn.index);
            assert!(podcast.samples[cursor + len].abs() < 1e-3, "gap after turn {}", turn.index);
            cursor += len + gap;
        }
    }

    #[tokio::test]
    async fn test_speech_retries_within_budget() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        config.synthesis.concurrency = 1;
        let (services, collaborators) = services_with_speech(ToneSpeech::new(RATE).with_failures(2, true));
        let orchestrator = PipelineOrchestrator::new(config, collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert_eq!(result.status(Stage::Audio), StageStatus::Succeeded);
        assert_eq!(services.speech.call_count(), read_turns(&result).len() + 2);
    }

    #[tokio::test]
    async fn test_speech_fails_when_budget_is_spent() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        config.synthesis.concurrency = 1;
        let (services, collaborators) = services_with_speech(ToneSpeech::new(RATE).with_failures(3, true));
        let orchestrator = PipelineOrchestrator::new(config, collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert_eq!(failure_kind(&result, Stage::Audio), Some(ErrorKind::TransientService));
        assert_eq!(services.speech.call_count(), 3);
        assert!(result.artifact(ArtifactKind::Podcast).is_none());
        assert!(!result.run_dir.join("podcast.wav").exists());
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_permanent_speech_error_is_not_retried() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        config.synthesis.concurrency = 1;
        let (services, collaborators) = services_with_speech(ToneSpeech::new(RATE).with_failures(1, false));
        let orchestrator = PipelineOrchestrator::new(config, collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert_eq!(failure_kind(&result, Stage::Audio), Some(ErrorKind::Service));
        assert_eq!(services.speech.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_topic_fails_search() {
        let root = tempfile::tempdir().unwrap();
        let services = FakeServices::healthy(RATE);
        let orchestrator = PipelineOrchestrator::new(config(root.path()), services.collaborators());

        let result = orchestrator.run("   ").await.unwrap();

        assert!(!result.is_success());
        assert_eq!(failure_kind(&result, Stage::Search), Some(ErrorKind::Content));
        assert!(services.search.queries().is_empty());
        for stage in [Stage::Article, Stage::Script, Stage::Audio, Stage::Image] {
            assert!(matches!(result.status(stage), StageStatus::Skipped(_)), "{stage}");
        }
        assert!(!result.run_dir.join("article.md").exists());
        assert!(result.run_dir.join("pipeline.log").is_file());
        assert!(result.run_dir.to_string_lossy().ends_with("_untitled"));
    }

    #[tokio::test]
    async fn test_missing_speech_credential_skips_audio() {
        let root = tempfile::tempdir().unwrap();
        let services = FakeServices::healthy(RATE);
        let collaborators = Collaborators::new()
            .with_search(services.search.clone())
            .with_text(services.text.clone())
            .with_image(services.image.clone());
        let orchestrator = PipelineOrchestrator::new(config(root.path()), collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.status(Stage::Script), StageStatus::Succeeded);
        match result.status(Stage::Audio) {
            StageStatus::Skipped(reason) => assert!(reason.contains("TTS_API_KEY"), "{reason}"),
            other => panic!("expected audio to be skipped, got {other:?}"),
        }
        assert!(result.artifact(ArtifactKind::Podcast).is_none());
        assert!(result.artifact(ArtifactKind::Cover).is_some());
    }

    #[tokio::test]
    async fn test_long_generated_turn_is_split_before_synthesis() {
        let root = tempfile::tempdir().unwrap();
        let long = "The benchmark result surprised almost everyone in the field. ".repeat(20);
        let reply = serde_json::json!([
            {"role": "Host", "text": "Welcome to the show."},
            {"role": "Guest", "text": long.trim()},
            {"role": "Host", "text": "Thanks for listening."},
        ])
        .to_string();
        let text = ScriptedText::new(move |request| {
            if request.prompt.contains("podcast conversation") {
                Ok(reply.clone())
            } else {
                Ok(sample_article())
            }
        });
        let services = FakeServices::healthy(RATE);
        let collaborators = services.collaborators().with_text(Arc::new(text));
        let orchestrator = PipelineOrchestrator::new(config(root.path()), collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert_eq!(result.status(Stage::Script), StageStatus::Succeeded);
        assert_eq!(result.status(Stage::Audio), StageStatus::Succeeded);
        let turns = read_turns(&result);
        assert_eq!(turns.first().unwrap().text, "Welcome to the show.");
        let limit = orchestrator.config().script_config().max_turn_chars;
        assert!(turns.iter().all(|t| t.text.chars().count() <= limit));
        assert!(services
            .speech
            .texts()
            .iter()
            .all(|t| t.chars().count() <= orchestrator.config().synthesis.max_text_chars));
    }

    #[tokio::test]
    async fn test_missing_image_credential_skips_cover_only() {
        let root = tempfile::tempdir().unwrap();
        let services = FakeServices::healthy(RATE);
        let collaborators = Collaborators::new()
            .with_search(services.search.clone())
            .with_text(services.text.clone())
            .with_speech(services.speech.clone());
        let orchestrator = PipelineOrchestrator::new(config(root.path()), collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert!(result.is_success());
        match result.status(Stage::Image) {
            StageStatus::Skipped(reason) => assert!(reason.contains("SILICONFLOW_API_KEY"), "{reason}"),
            other => panic!("expected image to be skipped, got {other:?}"),
        }
        assert_eq!(services.image.calls(), 0);
        for stage in [Stage::Search, Stage::Article, Stage::Script, Stage::Audio] {
            assert_eq!(result.status(stage), StageStatus::Succeeded, "{stage}");
        }

        let dir = &result.run_dir;
        for name in ["article.md", "script.json", "podcast.wav", "pipeline.log"] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        assert!(!dir.join("cover.jpg").exists());
        assert_eq!(result.counts.skipped, 1);
    }

    #[tokio::test]
    async fn test_background_stays_under_speech() {
        let root = tempfile::tempdir().unwrap();
        let bgm = root.path().join("bgm.wav");
        let loud = PcmBuffer::new(vec![0.9; RATE as usize / 2], RATE);
        std::fs::write(&bgm, codec::encode_wav(&loud).unwrap()).unwrap();

        let mut config = config(&root.path().join("out"));
        config.mix.background_path = Some(bgm);
        let services = FakeServices::healthy(RATE);
        let orchestrator = PipelineOrchestrator::new(config, services.collaborators());

        let result = orchestrator.run("open models").await.unwrap();
        let podcast = codec::decode_file(result.artifact(ArtifactKind::Podcast).unwrap()).unwrap();

        let mix = &orchestrator.config().mix;
        let ceiling = mix.attenuation_factor() * 0.5 * db_to_linear(2.0);
        let lead = &podcast.samples[..mix.samples_for_ms(mix.lead_in_ms)];
        let loudest = lead.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!(loudest > 0.0);
        assert!(loudest <= ceiling + 2e-3, "{loudest} > {ceiling}");
    }

    #[tokio::test]
    async fn test_unreadable_background_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let bgm = root.path().join("bgm.mp3");
        std::fs::write(&bgm, b"not audio").unwrap();

        let mut config = config(&root.path().join("out"));
        config.mix.background_path = Some(bgm);
        let services = FakeServices::healthy(RATE);
        let orchestrator = PipelineOrchestrator::new(config, services.collaborators());

        let result = orchestrator.run("open models").await.unwrap();
        assert_eq!(result.status(Stage::Audio), StageStatus::Succeeded);
    }

    struct HangingSpeech;

    #[async_trait]
    impl SpeechBackend for HangingSpeech {
        async fn synthesize(&self, _voice: &VoiceProfile, _text: &str) -> Result<PcmBuffer, SynthesisError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(SynthesisError::transient("unreachable"))
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_running_stage_without_partial_output() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path()).with_run_timeout(Duration::from_millis(300));
        let collaborators = FakeServices::healthy(RATE)
            .collaborators()
            .with_speech(Arc::new(HangingSpeech));
        let orchestrator = PipelineOrchestrator::new(config, collaborators);

        let result = orchestrator.run("open models").await.unwrap();

        assert_eq!(failure_kind(&result, Stage::Audio), Some(ErrorKind::Cancelled));
        assert_eq!(result.status(Stage::Image), StageStatus::Succeeded);
        assert!(!result.run_dir.join("podcast.wav").exists());
        assert!(staged_leftovers(&result.run_dir).is_empty());
        assert!(result.is_success());
    }

    /// Hangs while `hang` is set, otherwise speaks like [`ToneSpeech`].
    struct GatedSpeech {
        hang: AtomicBool,
        tone: ToneSpeech,
    }

    #[async_trait]
    impl SpeechBackend for GatedSpeech {
        async fn synthesize(&self, voice: &VoiceProfile, text: &str) -> Result<PcmBuffer, SynthesisError> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.tone.synthesize(voice, text).await
        }
    }

    #[tokio::test]
    async fn test_timed_out_run_does_not_cancel_the_next() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path()).with_run_timeout(Duration::from_millis(300));
        let speech = Arc::new(GatedSpeech {
            hang: AtomicBool::new(true),
            tone: ToneSpeech::new(RATE),
        });
        let collaborators = FakeServices::healthy(RATE).collaborators().with_speech(speech.clone());
        let orchestrator = PipelineOrchestrator::new(config, collaborators);

        let first = orchestrator.run("open models").await.unwrap();
        assert_eq!(failure_kind(&first, Stage::Audio), Some(ErrorKind::Cancelled));

        speech.hang.store(false, Ordering::SeqCst);
        let second = orchestrator.run("open models").await.unwrap();

        assert_ne!(first.run_dir, second.run_dir);
        assert!(!orchestrator.cancellation_token().is_cancelled());
        for stage in Stage::ALL {
            assert_eq!(second.status(stage), StageStatus::Succeeded, "{stage}");
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_publishes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel("user abort");
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = PipelineOrchestrator::new(config(root.path()), FakeServices::healthy(RATE).collaborators())
            .with_cancellation(token)
            .with_sink(sink.clone());

        let result = orchestrator.run("open models").await.unwrap();

        assert!(!result.is_success());
        assert_eq!(failure_kind(&result, Stage::Search), Some(ErrorKind::Cancelled));
        assert!(result.artifact(ArtifactKind::Article).is_none());
        assert!(!result.run_dir.join("article.md").exists());
        assert!(sink.events().iter().all(|e| e.event_type() != "artifact.published"));
        assert_eq!(sink.events().last().unwrap().event_type(), "run.finished");
    }

    fn segment(index: usize, len: usize) -> AudioSegment {
        AudioSegment::new(index, PcmBuffer::new(vec![0.1 * (index + 1) as f32; len], RATE))
    }

    #[test]
    fn test_assembly_is_independent_of_arrival_order() {
        let assembler = AudioAssembler::new(MixConfig {
            sample_rate: RATE,
            ..MixConfig::default()
        });
        let lens = [800, 1200, 400, 1600, 1000];
        let background = PcmBuffer::new((0..3000).map(|i| (i % 7) as f32 / 10.0).collect(), RATE);
        let build = |order: &[usize]| {
            assembler
                .assemble(order.iter().map(|&i| segment(i, lens[i])), lens.len(), Some(&background))
                .unwrap()
        };

        let reference = build(&[0, 1, 2, 3, 4]);
        for order in [[4, 3, 2, 1, 0], [2, 0, 4, 1, 3], [1, 0, 3, 2, 4]] {
            let mixed = build(&order);
            assert_eq!(mixed.len(), reference.len());
            assert_eq!(mixed.placements, reference.placements);
            assert_eq!(mixed.samples, reference.samples);
        }
    }

    #[test]
    fn test_assembly_rejects_gap_in_indices() {
        let assembler = AudioAssembler::new(MixConfig {
            sample_rate: RATE,
            ..MixConfig::default()
        });

        let err = assembler
            .assemble([0, 1, 3].map(|i| segment(i, 100)), 4, None)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::MissingTurn { index: 2, .. }), "{err}");
    }
}
