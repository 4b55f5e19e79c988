//! Multi-track assembly: speech timeline over a ducked background bed.
//!
//! The speech track is laid out by [`SpeechTimeline`], padded with a lead-in
//! and a tail, and summed with the background. The background is looped or
//! truncated to the padded length, faded in and out, and attenuated by
//! `background_attenuation_db`. A track too loud for that to keep its peak
//! at least as far below the speech peak is turned down further; a quiet
//! track is never turned up.

use crate::audio::pcm::{peak, samples_to_duration, PcmBuffer};
use crate::audio::timeline::{AudioSegment, SpeechTimeline, SpeechTrack, TurnPlacement};
use crate::config::MixConfig;
use crate::errors::AssemblyError;
use std::time::Duration;
use tracing::debug;

/// The final mix. Written once by the assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedTrack {
    /// Mono samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Samples per second.
    pub sample_rate: u32,
    /// Where each turn starts on the final track, in turn order.
    pub placements: Vec<TurnPlacement>,
    /// Peak of the speech component.
    pub speech_peak: f32,
    /// Peak of the background component after gain and fades.
    pub background_peak: f32,
}

impl MixedTrack {
    /// Total playback length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the track is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Assembles synthesized segments into one [`MixedTrack`].
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    config: MixConfig,
}

impl AudioAssembler {
    /// Creates an assembler.
    #[must_use]
    pub fn new(config: MixConfig) -> Self {
        Self { config }
    }

    /// Gets the mixing settings.
    #[must_use]
    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    /// Creates an empty ordering buffer for `expected` turns.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::NoTurns`] when `expected` is zero.
    pub fn timeline(&self, expected: usize) -> Result<SpeechTimeline, AssemblyError> {
        SpeechTimeline::new(
            expected,
            self.config.sample_rate,
            self.config.samples_for_ms(self.config.gap_ms),
        )
    }

    /// Orders `segments` by turn index and mixes them over `background`.
    ///
    /// Arrival order of `segments` does not matter.
    ///
    /// # Errors
    ///
    /// Returns an [`AssemblyError`] if the segments do not cover
    /// `0..expected_turns` exactly once each at the mix sample rate.
    pub fn assemble<I>(
        &self,
        segments: I,
        expected_turns: usize,
        background: Option<&PcmBuffer>,
    ) -> Result<MixedTrack, AssemblyError>
    where
        I: IntoIterator<Item = AudioSegment>,
    {
        let mut timeline = self.timeline(expected_turns)?;
        for segment in segments {
            timeline.push(segment)?;
        }
        Ok(self.mix(timeline.finish()?, background))
    }

    /// Pads a finished speech track and lays the background under it.
    #[must_use]
    pub fn mix(&self, speech: SpeechTrack, background: Option<&PcmBuffer>) -> MixedTrack {
        let sample_rate = self.config.sample_rate;
        let lead = self.config.samples_for_ms(self.config.lead_in_ms);
        let tail = self.config.samples_for_ms(self.config.tail_ms);
        let total = lead + speech.pcm.len() + tail;

        let speech_peak = speech.pcm.peak();
        let mut samples = vec![0.0_f32; total];
        samples[lead..lead + speech.pcm.len()].copy_from_slice(&speech.pcm.samples);

        let background_peak = match background.filter(|bg| !bg.is_empty()) {
            Some(bg) => self.lay_background(&mut samples, bg, speech_peak),
            None => 0.0,
        };

        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let placements = speech
            .placements
            .into_iter()
            .map(|p| TurnPlacement {
                start_sample: p.start_sample + lead,
                ..p
            })
            .collect();

        debug!(
            total_samples = total,
            speech_peak,
            background_peak,
            "Assembled mixed track"
        );

        MixedTrack {
            samples,
            sample_rate,
            placements,
            speech_peak,
            background_peak,
        }
    }

    /// Sums the background into `out` and returns its resulting peak.
    fn lay_background(&self, out: &mut [f32], background: &PcmBuffer, speech_peak: f32) -> f32 {
        let bg = if background.sample_rate == self.config.sample_rate {
            background.samples.clone()
        } else {
            background.clone().resampled(self.config.sample_rate).samples
        };
        let bg_peak = peak(&bg);
        if bg.is_empty() || bg_peak <= 0.0 {
            return 0.0;
        }

        let gain = self.config.attenuation_factor() * (speech_peak / bg_peak).min(1.0);
        let total = out.len();
        let (fade_in, fade_out) = fit_fades(
            self.config.samples_for_ms(self.config.fade_in_ms),
            self.config.samples_for_ms(self.config.fade_out_ms),
            total,
        );

        let mut laid_peak = 0.0_f32;
        for (i, sample) in out.iter_mut().enumerate() {
            let envelope = fade_envelope(i, total, fade_in, fade_out);
            let value = bg[i % bg.len()] * gain * envelope;
            laid_peak = laid_peak.max(value.abs());
            *sample += value;
        }
        laid_peak
    }
}

/// Shrinks fades proportionally so they never overlap.
fn fit_fades(fade_in: usize, fade_out: usize, total: usize) -> (usize, usize) {
    let sum = fade_in + fade_out;
    if sum <= total || sum == 0 {
        return (fade_in, fade_out);
    }
    let fade_in = fade_in * total / sum;
    (fade_in, total - fade_in)
}

fn fade_envelope(i: usize, total: usize, fade_in: usize, fade_out: usize) -> f32 {
    let mut envelope = 1.0_f32;
    if fade_in > 0 && i < fade_in {
        envelope = envelope.min(i as f32 / fade_in as f32);
    }
    if fade_out > 0 && i + fade_out >= total {
        envelope = envelope.min((total - i) as f32 / fade_out as f32);
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> MixConfig {
        MixConfig {
            sample_rate: 1000,
            gap_ms: 10,
            lead_in_ms: 0,
            tail_ms: 0,
            fade_in_ms: 0,
            fade_out_ms: 0,
            ..MixConfig::default()
        }
    }

    fn segment(index: usize, len: usize) -> AudioSegment {
        AudioSegment::new(index, PcmBuffer::new(vec![0.5; len], 1000))
    }

    #[test]
    fn test_length_without_background() {
        let assembler = AudioAssembler::new(config());
        let mixed = assembler
            .assemble(vec![segment(0, 100), segment(1, 50)], 2, None)
            .unwrap();

        assert_eq!(mixed.len(), 160);
        assert_eq!(mixed.background_peak, 0.0);
        assert_eq!(mixed.placements[1].start_sample, 110);
    }

    #[test]
    fn test_lead_in_and_tail_pad() {
        let assembler = AudioAssembler::new(MixConfig {
            lead_in_ms: 100,
            tail_ms: 200,
            ..config()
        });
        let mixed = assembler.assemble(vec![segment(0, 10)], 1, None).unwrap();

        assert_eq!(mixed.len(), 310);
        assert_eq!(mixed.placements[0].start_sample, 100);
        assert_eq!(mixed.samples[99], 0.0);
        assert_eq!(mixed.samples[100], 0.5);
    }

    #[test]
    fn test_background_is_looped_to_length() {
        let assembler = AudioAssembler::new(config());
        let bg = PcmBuffer::new(vec![1.0, -1.0, 0.5], 1000);
        let mixed = assembler
            .assemble(vec![segment(0, 10)], 1, Some(&bg))
            .unwrap();

        assert_eq!(mixed.len(), 10);
        assert!(mixed.background_peak > 0.0);
    }

    #[test]
    fn test_background_stays_under_ceiling() {
        let assembler = AudioAssembler::new(MixConfig {
            background_attenuation_db: 15.0,
            ..config()
        });
        let bg = PcmBuffer::new(vec![0.9; 7], 1000);
        let mixed = assembler
            .assemble(vec![segment(0, 40)], 1, Some(&bg))
            .unwrap();

        let ceiling = assembler.config().attenuation_factor() * mixed.speech_peak;
        assert!(mixed.background_peak <= ceiling + 1e-6);
    }

    #[test]
    fn test_quiet_background_is_only_attenuated() {
        let assembler = AudioAssembler::new(MixConfig {
            background_attenuation_db: 15.0,
            ..config()
        });
        let bg = PcmBuffer::new(vec![0.01; 7], 1000);
        let mixed = assembler
            .assemble(vec![segment(0, 40)], 1, Some(&bg))
            .unwrap();

        let expected = 0.01 * assembler.config().attenuation_factor();
        assert!((mixed.background_peak - expected).abs() < 1e-6, "{}", mixed.background_peak);
        assert!(mixed.background_peak < 0.01);
    }

    #[test]
    fn test_silent_speech_mutes_background() {
        let assembler = AudioAssembler::new(MixConfig {
            fade_in_ms: 20,
            fade_out_ms: 20,
            ..config()
        });
        let speech = SpeechTrack {
            pcm: PcmBuffer::new(vec![0.0; 50], 1000),
            placements: Vec::new(),
        };
        let bg = PcmBuffer::new(vec![0.5; 10], 1000);
        let mixed = assembler.mix(speech, Some(&bg));

        assert_eq!(mixed.background_peak, 0.0);
    }

    #[test]
    fn test_fit_fades() {
        assert_eq!(fit_fades(20, 30, 100), (20, 30));
        assert_eq!(fit_fades(200, 300, 100), (40, 60));
        assert_eq!(fit_fades(0, 0, 0), (0, 0));
    }

    #[test]
    fn test_fade_envelope_edges() {
        assert_eq!(fade_envelope(0, 100, 10, 10), 0.0);
        assert_eq!(fade_envelope(50, 100, 10, 10), 1.0);
        assert!((fade_envelope(99, 100, 10, 10) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_output_is_clipped() {
        let assembler = AudioAssembler::new(MixConfig {
            background_attenuation_db: 0.0,
            ..config()
        });
        let loud = AudioSegment::new(0, PcmBuffer::new(vec![1.0; 10], 1000));
        let bg = PcmBuffer::new(vec![1.0; 10], 1000);
        let mixed = assembler.assemble(vec![loud], 1, Some(&bg)).unwrap();

        assert!(mixed.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
