//! Testing utilities for topicast pipelines.
//!
//! This module provides deterministic, in-process fakes of the search, text,
//! image and speech services, so whole runs can be exercised offline.

pub mod fakes;

pub use fakes::{sample_article, FakeServices, ScriptedText, StaticImage, StaticSearch, ToneSpeech};
