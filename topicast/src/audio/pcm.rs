//! Mono floating-point PCM buffers.

use std::time::Duration;

/// A mono block of samples in `[-1.0, 1.0]` at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// The samples.
    pub samples: Vec<f32>,
    /// Samples per second.
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Creates a buffer from samples.
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Creates `len` samples of silence.
    #[must_use]
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Largest absolute sample value.
    #[must_use]
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }

    /// Applies a gain in dB, clamping the result to `[-1.0, 1.0]`.
    pub fn apply_gain_db(&mut self, gain_db: f32) {
        if gain_db == 0.0 {
            return;
        }
        let factor = db_to_linear(gain_db);
        for sample in &mut self.samples {
            *sample = (*sample * factor).clamp(-1.0, 1.0);
        }
    }

    /// Returns the buffer at `target_rate`, using linear interpolation.
    #[must_use]
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() || self.sample_rate == 0 {
            return Self::new(self.samples, target_rate);
        }

        let ratio = f64::from(self.sample_rate) / f64::from(target_rate);
        let out_len = ((self.samples.len() as f64) / ratio).round() as usize;
        let last = self.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] + (self.samples[next] - self.samples[idx]) * frac
            })
            .collect();

        Self::new(samples, target_rate)
    }
}

/// Largest absolute value in `samples`.
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Converts decibels to a linear amplitude factor.
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Converts a sample count to a duration.
#[must_use]
pub fn samples_to_duration(len: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(len as f64 / f64::from(sample_rate))
}

/// Averages interleaved frames down to one channel.
#[must_use]
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_and_duration() {
        let buf = PcmBuffer::silence(24_000, 24_000);
        assert_eq!(buf.len(), 24_000);
        assert_eq!(buf.duration(), Duration::from_secs(1));
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_gain_clamps() {
        let mut buf = PcmBuffer::new(vec![0.5, -0.9], 8000);
        buf.apply_gain_db(12.0);
        assert_eq!(buf.samples, vec![1.0, -1.0]);
    }

    #[test]
    fn test_gain_db_scaling() {
        let mut buf = PcmBuffer::new(vec![0.5], 8000);
        buf.apply_gain_db(-20.0);
        assert!((buf.samples[0] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_resample_halves_length() {
        let buf = PcmBuffer::new(vec![0.0, 0.5, 1.0, 0.5], 16_000).resampled(8_000);
        assert_eq!(buf.sample_rate, 8_000);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.samples[0], 0.0);
        assert_eq!(buf.samples[1], 1.0);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let buf = PcmBuffer::new(vec![0.1, 0.2], 24_000);
        assert_eq!(buf.clone().resampled(24_000), buf);
    }

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.3], 1), vec![0.3]);
    }
}
