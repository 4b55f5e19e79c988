//! Per-turn speech synthesis.

use crate::audio::pcm::PcmBuffer;
use crate::audio::timeline::AudioSegment;
use crate::config::{SynthesisConfig, VoiceProfile};
use crate::core::{DialogueTurn, Speaker};
use crate::errors::SynthesisError;
use crate::providers::SpeechBackend;
use std::sync::Arc;
use tracing::debug;

/// Turns one (speaker, text) pair into one speech segment.
///
/// Each speaker maps to a fixed [`VoiceProfile`]. The returned audio is mono,
/// at the mix sample rate, with the voice gain applied.
#[derive(Clone)]
pub struct SpeechSynthesisAdapter {
    backend: Arc<dyn SpeechBackend>,
    config: SynthesisConfig,
    sample_rate: u32,
}

impl std::fmt::Debug for SpeechSynthesisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSynthesisAdapter")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl SpeechSynthesisAdapter {
    /// Creates an adapter producing audio at `sample_rate`.
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>, config: SynthesisConfig, sample_rate: u32) -> Self {
        Self {
            backend,
            config,
            sample_rate,
        }
    }

    /// The voice used for `speaker`.
    #[must_use]
    pub fn voice_for(&self, speaker: Speaker) -> &VoiceProfile {
        match speaker {
            Speaker::Host => &self.config.host_voice,
            Speaker::Guest => &self.config.guest_voice,
        }
    }

    /// Synthesizes `text` in the voice of `speaker`.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError`] for empty or oversized text, a call that
    /// exceeds the configured timeout, a service failure, or audio that
    /// decodes to nothing.
    pub async fn synthesize(&self, speaker: Speaker, text: &str) -> Result<PcmBuffer, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let len = text.chars().count();
        if len > self.config.max_text_chars {
            return Err(SynthesisError::TextTooLong {
                len,
                max: self.config.max_text_chars,
            });
        }

        let voice = self.voice_for(speaker);
        let timeout = self.config.timeout();
        let call = self.backend.synthesize(voice, text);
        let pcm = if timeout.is_zero() {
            call.await?
        } else {
            tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| SynthesisError::Timeout { timeout })??
        };

        if pcm.is_empty() {
            return Err(SynthesisError::Decode("service returned no audio".to_string()));
        }

        let mut pcm = pcm.resampled(self.sample_rate);
        pcm.apply_gain_db(voice.gain_db);

        debug!(
            speaker = %speaker,
            chars = len,
            seconds = pcm.duration().as_secs_f64(),
            "Synthesized speech"
        );
        Ok(pcm)
    }

    /// Synthesizes one dialogue turn.
    ///
    /// # Errors
    ///
    /// See [`Self::synthesize`].
    pub async fn synthesize_turn(&self, turn: &DialogueTurn) -> Result<AudioSegment, SynthesisError> {
        let pcm = self.synthesize(turn.speaker, &turn.text).await?;
        Ok(AudioSegment::new(turn.index, pcm))
    }
}
