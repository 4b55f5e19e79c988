//! Ordering of synthesized segments into a speech timeline.
//!
//! Segments arrive in completion order, which is arbitrary under concurrent
//! synthesis. [`SpeechTimeline`] holds early arrivals until every lower index
//! has been placed, so the resulting track always follows turn order.

use crate::audio::pcm::PcmBuffer;
use crate::errors::AssemblyError;
use std::collections::BTreeMap;

/// Synthesized audio for exactly one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Index of the turn this audio belongs to.
    pub turn_index: usize,
    /// The speech.
    pub pcm: PcmBuffer,
}

impl AudioSegment {
    /// Creates a segment.
    #[must_use]
    pub fn new(turn_index: usize, pcm: PcmBuffer) -> Self {
        Self { turn_index, pcm }
    }

    /// Playback length of the segment.
    #[must_use]
    pub fn duration(&self) -> std::time::Duration {
        self.pcm.duration()
    }
}

/// Where a turn landed on the speech track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnPlacement {
    /// The turn.
    pub turn_index: usize,
    /// First sample of the turn, relative to the speech track start.
    pub start_sample: usize,
    /// Length in samples.
    pub len: usize,
}

/// The finished speech track plus turn positions.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTrack {
    /// Concatenated speech with gaps.
    pub pcm: PcmBuffer,
    /// One entry per turn, in turn order.
    pub placements: Vec<TurnPlacement>,
}

/// Incremental ordering buffer for segments of `0..expected` turns.
#[derive(Debug)]
pub struct SpeechTimeline {
    expected: usize,
    sample_rate: u32,
    gap_samples: usize,
    next_index: usize,
    pending: BTreeMap<usize, PcmBuffer>,
    samples: Vec<f32>,
    placements: Vec<TurnPlacement>,
}

impl SpeechTimeline {
    /// Creates a timeline expecting turns `0..expected`.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::NoTurns`] when `expected` is zero.
    pub fn new(expected: usize, sample_rate: u32, gap_samples: usize) -> Result<Self, AssemblyError> {
        if expected == 0 {
            return Err(AssemblyError::NoTurns);
        }
        Ok(Self {
            expected,
            sample_rate,
            gap_samples,
            next_index: 0,
            pending: BTreeMap::new(),
            samples: Vec::new(),
            placements: Vec::with_capacity(expected),
        })
    }

    /// Number of segments accepted so far, placed or held.
    #[must_use]
    pub fn received(&self) -> usize {
        self.next_index + self.pending.len()
    }

    /// Number of segments placed on the track.
    #[must_use]
    pub fn placed(&self) -> usize {
        self.next_index
    }

    /// Accepts one segment and places every segment that is now in order.
    ///
    /// # Errors
    ///
    /// Rejects indices outside `0..expected`, repeated indices, and segments
    /// at a different sample rate.
    pub fn push(&mut self, segment: AudioSegment) -> Result<(), AssemblyError> {
        let index = segment.turn_index;
        if index >= self.expected {
            return Err(AssemblyError::UnexpectedTurn {
                index,
                expected: self.expected,
            });
        }
        if index < self.next_index || self.pending.contains_key(&index) {
            return Err(AssemblyError::DuplicateTurn { index });
        }
        if segment.pcm.sample_rate != self.sample_rate {
            return Err(AssemblyError::SampleRateMismatch {
                index,
                found: segment.pcm.sample_rate,
                expected: self.sample_rate,
            });
        }

        self.pending.insert(index, segment.pcm);
        while let Some(pcm) = self.pending.remove(&self.next_index) {
            self.place(pcm);
        }
        Ok(())
    }

    fn place(&mut self, pcm: PcmBuffer) {
        if self.next_index > 0 {
            self.samples
                .extend(std::iter::repeat(0.0).take(self.gap_samples));
        }
        self.placements.push(TurnPlacement {
            turn_index: self.next_index,
            start_sample: self.samples.len(),
            len: pcm.samples.len(),
        });
        self.samples.extend_from_slice(&pcm.samples);
        self.next_index += 1;
    }

    /// Finishes the timeline.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::MissingTurn`] naming the first index that
    /// never arrived.
    pub fn finish(self) -> Result<SpeechTrack, AssemblyError> {
        if self.next_index < self.expected {
            return Err(AssemblyError::MissingTurn {
                index: self.next_index,
                received: self.received(),
                expected: self.expected,
            });
        }
        Ok(SpeechTrack {
            pcm: PcmBuffer::new(self.samples, self.sample_rate),
            placements: self.placements,
        })
    }
}
