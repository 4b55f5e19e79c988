//! Event sink trait and implementations.

use crate::events::PipelineEvent;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Receives run events.
///
/// Sinks must never fail the run: errors are logged and suppressed.
pub trait EventSink: Send + Sync {
    /// Emits an event without blocking on anything but local IO.
    fn try_emit(&self, event: &PipelineEvent);
}

/// Appends one timestamped line per event to `pipeline.log`.
#[derive(Debug)]
pub struct RunLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLogSink {
    /// Opens (or creates) the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for RunLogSink {
    fn try_emit(&self, event: &PipelineEvent) {
        let line = format!("{} {}\n", crate::utils::format_iso8601(&event.timestamp), event);
        let mut file = self.file.lock();
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write run log");
        }
    }
}

/// Logs events through `tracing`, failures at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: &PipelineEvent) {
        if event.is_error() {
            error!(event_type = event.event_type(), "{event}");
        } else if event.is_warning() {
            warn!(event_type = event.event_type(), "{event}");
        } else {
            info!(event_type = event.event_type(), "{event}");
        }
    }
}

/// A collecting event sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
