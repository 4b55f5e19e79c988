//! Speech synthesis and multi-track assembly.
//!
//! - [`SpeechSynthesisAdapter`]: one turn in, one mono segment out
//! - [`SpeechTimeline`]: ordering buffer for segments arriving out of order
//! - [`AudioAssembler`]: timeline plus ducked background into a [`MixedTrack`]
//! - [`codec`]: container decoding and encoding

pub mod codec;
mod mixer;
mod pcm;
mod synthesis;
mod timeline;

pub use mixer::{AudioAssembler, MixedTrack};
pub use pcm::{db_to_linear, downmix, peak, samples_to_duration, PcmBuffer};
pub use synthesis::SpeechSynthesisAdapter;
pub use timeline::{AudioSegment, SpeechTimeline, SpeechTrack, TurnPlacement};
