//! One pipeline run: its directory, status ledger, artifacts and log.

use crate::cancellation::CancellationToken;
use crate::core::{Artifact, ArtifactKind, PendingArtifact, Stage, StageFailure, StageStatus};
use crate::errors::{ErrorKind, PipelineError};
use crate::events::{EventKind, EventSink, LoggingEventSink, PipelineEvent, RunLogSink};
use crate::pipeline::ledger::{FailureRecord, LedgerSummary, StageLedger};
use crate::utils::{now_utc, run_stamp, sanitize_topic, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Final status of one stage and the files it published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Terminal status.
    pub status: StageStatus,
    /// Published artifact paths.
    pub artifacts: Vec<PathBuf>,
}

/// What a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// The topic as given.
    pub topic: String,
    /// The run directory.
    pub run_dir: PathBuf,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
    /// Outcome per stage.
    pub stages: BTreeMap<Stage, StageOutcome>,
    /// Every published artifact.
    pub artifacts: Vec<Artifact>,
    /// Stages that failed or were skipped, in order.
    pub failures: Vec<FailureRecord>,
    /// Stage counts per terminal state.
    pub counts: LedgerSummary,
}

impl RunResult {
    /// Returns true when the article was produced.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status(Stage::Article).is_success()
    }

    /// Final status of `stage`.
    #[must_use]
    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stages
            .get(&stage)
            .map(|o| o.status.clone())
            .unwrap_or_default()
    }

    /// Path of a published artifact.
    #[must_use]
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.path.as_path())
    }

    /// Human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Topic: {}", self.topic);
        let _ = writeln!(out, "Run directory: {}", self.run_dir.display());
        for (stage, outcome) in &self.stages {
            let stage = stage.to_string();
            match outcome.status.reason() {
                Some(reason) => {
                    let _ = writeln!(out, "  {stage:<8} {}: {reason}", outcome.status);
                }
                None => {
                    let _ = writeln!(out, "  {stage:<8} {}", outcome.status);
                }
            }
            for path in &outcome.artifacts {
                let _ = writeln!(out, "           -> {}", path.display());
            }
        }
        let _ = writeln!(
            out,
            "Stages: {} succeeded, {} failed, {} skipped",
            self.counts.succeeded, self.counts.failed, self.counts.skipped
        );
        let verdict = if self.is_success() { "success" } else { "failed" };
        let _ = write!(out, "Result: {verdict}");
        out
    }
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    run_id: Uuid,
    topic: &'a str,
    started_at: Timestamp,
    finished_at: Timestamp,
    success: bool,
    counts: &'a LedgerSummary,
    stages: &'a BTreeMap<Stage, StageOutcome>,
    artifacts: &'a [Artifact],
    log: &'a Path,
}

/// Mutable state of a run in progress.
///
/// The ledger and `manifest.json` are the record of what a run produced.
/// A stage's files are renamed into the run directory while the ledger
/// lock is held and the stage is recorded as succeeded right after, so a
/// ledger reader never sees a succeeded stage without its files. Someone
/// listing the directory may see a file a moment before its stage is
/// recorded as succeeded; a file that fails to move takes the ones
/// already moved with it.
pub struct PipelineRun {
    id: Uuid,
    topic: String,
    started_at: Timestamp,
    dir: PathBuf,
    log_path: PathBuf,
    ledger: Mutex<StageLedger>,
    artifacts: Mutex<Vec<Artifact>>,
    sinks: Vec<Arc<dyn EventSink>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl PipelineRun {
    /// Creates the run directory under `output_root` and opens the run log.
    ///
    /// The directory is `<YYYYmmdd_HHMMSS>_<sanitized topic>`; a numeric
    /// suffix is added if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory or log cannot be created.
    pub fn create(
        output_root: &Path,
        topic: &str,
        extra_sinks: Vec<Arc<dyn EventSink>>,
    ) -> Result<Self, PipelineError> {
        let started_at = now_utc();
        let base = format!("{}_{}", run_stamp(&started_at), sanitize_topic(topic));
        std::fs::create_dir_all(output_root)?;

        let mut dir = output_root.join(&base);
        let mut suffix = 1;
        while dir.exists() {
            suffix += 1;
            dir = output_root.join(format!("{base}_{suffix}"));
        }
        std::fs::create_dir(&dir)?;

        let log_path = dir.join(ArtifactKind::Log.file_name());
        let mut sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(RunLogSink::open(&log_path)?),
            Arc::new(LoggingEventSink),
        ];
        sinks.extend(extra_sinks);

        let run = Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            started_at,
            dir,
            log_path,
            ledger: Mutex::new(StageLedger::new()),
            artifacts: Mutex::new(Vec::new()),
            sinks,
            cancel: CancellationToken::new(),
        };
        run.emit(EventKind::RunStarted {
            topic: run.topic.clone(),
            run_id: run.id.to_string(),
            run_dir: run.dir.clone(),
        });
        Ok(run)
    }

    /// Run identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sends an event to every sink.
    pub fn emit(&self, kind: EventKind) {
        let event = PipelineEvent::new(kind);
        for sink in &self.sinks {
            sink.try_emit(&event);
        }
    }

    /// Aborts the run's stages when cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current status of `stage`.
    #[must_use]
    pub fn status(&self, stage: Stage) -> StageStatus {
        self.ledger.lock().status(stage)
    }

    /// Starts `stage` if its prerequisites succeeded, otherwise skips it.
    ///
    /// Returns true if the stage is now running.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the stage was already started.
    pub fn begin(&self, stage: Stage) -> Result<bool, PipelineError> {
        let mut ledger = self.ledger.lock();
        let next = match ledger.blocked_reason(stage) {
            Some(reason) => StageStatus::Skipped(reason),
            None => StageStatus::Running,
        };
        let running = next == StageStatus::Running;
        self.transition(&mut ledger, stage, next)?;
        Ok(running)
    }

    /// Skips a pending or running stage with `reason`.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an illegal transition.
    pub fn skip(&self, stage: Stage, reason: impl Into<String>) -> Result<(), PipelineError> {
        let mut ledger = self.ledger.lock();
        self.transition(&mut ledger, stage, StageStatus::Skipped(reason.into()))
    }

    /// Marks a running stage failed.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an illegal transition.
    pub fn fail(&self, stage: Stage, err: &PipelineError) -> Result<(), PipelineError> {
        let mut ledger = self.ledger.lock();
        self.transition(&mut ledger, stage, StageStatus::Failed(StageFailure::from(err)))
    }

    /// Marks a running stage succeeded and publishes its artifacts.
    ///
    /// Artifacts are written to hidden staging files first, then renamed
    /// into place, then the stage is recorded as succeeded. If any write or
    /// rename fails, nothing is published and the stage fails instead.
    ///
    /// # Errors
    ///
    /// Returns the IO error that prevented publication, after the stage has
    /// been marked failed.
    pub fn complete(&self, stage: Stage, pending: Vec<PendingArtifact>) -> Result<Vec<Artifact>, PipelineError> {
        let staged = match self.stage_files(&pending) {
            Ok(staged) => staged,
            Err(e) => {
                self.fail(stage, &e)?;
                return Err(e);
            }
        };

        let mut ledger = self.ledger.lock();
        if !ledger.status(stage).can_transition_to(&StageStatus::Succeeded) {
            discard(&staged);
            return Err(PipelineError::Internal(format!(
                "stage {stage} cannot succeed from {}",
                ledger.status(stage)
            )));
        }

        let mut published: Vec<Artifact> = Vec::with_capacity(pending.len());
        for (artifact, staging) in pending.iter().zip(&staged) {
            let target = self.dir.join(&artifact.file_name);
            if let Err(e) = std::fs::rename(staging, &target) {
                discard(&staged);
                for done in &published {
                    let _ = std::fs::remove_file(&done.path);
                }
                let err = PipelineError::from(e);
                self.transition(&mut ledger, stage, StageStatus::Failed(StageFailure::from(&err)))?;
                return Err(err);
            }
            published.push(Artifact::describe(artifact.kind, target, &artifact.bytes));
        }

        self.transition(&mut ledger, stage, StageStatus::Succeeded)?;
        for artifact in &published {
            self.emit(EventKind::ArtifactPublished {
                kind: artifact.kind,
                path: artifact.path.clone(),
            });
        }
        self.artifacts.lock().extend(published.iter().cloned());
        Ok(published)
    }

    fn stage_files(&self, pending: &[PendingArtifact]) -> Result<Vec<PathBuf>, PipelineError> {
        let mut staged = Vec::with_capacity(pending.len());
        for artifact in pending {
            let path = self.dir.join(format!(".{}.partial", artifact.file_name));
            if let Err(e) = std::fs::write(&path, &artifact.bytes) {
                discard(&staged);
                return Err(e.into());
            }
            staged.push(path);
        }
        Ok(staged)
    }

    fn transition(&self, ledger: &mut StageLedger, stage: Stage, next: StageStatus) -> Result<(), PipelineError> {
        ledger.transition(stage, next.clone())?;
        self.emit(EventKind::StageTransition { stage, status: next });
        Ok(())
    }

    /// Closes the run: settles unfinished stages, writes `manifest.json`
    /// and returns the result.
    #[must_use]
    pub fn finish(self) -> RunResult {
        {
            let mut ledger = self.ledger.lock();
            for stage in Stage::ALL {
                let next = match ledger.status(stage) {
                    StageStatus::Pending => StageStatus::Skipped("run ended before stage started".to_string()),
                    StageStatus::Running => StageStatus::Failed(StageFailure::new(
                        ErrorKind::Internal,
                        "run ended while stage was running",
                    )),
                    _ => continue,
                };
                if let Err(e) = self.transition(&mut ledger, stage, next) {
                    error!(error = %e, "Could not settle stage");
                }
            }
        }

        let ledger = self.ledger.lock().clone();
        let mut artifacts = self.artifacts.lock().clone();
        let stages: BTreeMap<Stage, StageOutcome> = ledger
            .snapshot()
            .into_iter()
            .map(|(stage, status)| {
                let paths = artifacts
                    .iter()
                    .filter(|a| a.kind.producer() == Some(stage))
                    .map(|a| a.path.clone())
                    .collect();
                (stage, StageOutcome { status, artifacts: paths })
            })
            .collect();

        let success = ledger.status(Stage::Article).is_success();
        let counts = ledger.summary();
        let finished_at = now_utc();
        let manifest = Manifest {
            run_id: self.id,
            topic: &self.topic,
            started_at: self.started_at,
            finished_at,
            success,
            counts: &counts,
            stages: &stages,
            artifacts: &artifacts,
            log: &self.log_path,
        };
        match serde_json::to_vec_pretty(&manifest) {
            Ok(bytes) => {
                let path = self.dir.join(ArtifactKind::Manifest.file_name());
                match std::fs::write(&path, &bytes) {
                    Ok(()) => artifacts.push(Artifact::describe(ArtifactKind::Manifest, path, &bytes)),
                    Err(e) => error!(error = %e, "Failed to write manifest"),
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize manifest"),
        }

        self.emit(EventKind::RunFinished { success });

        RunResult {
            run_id: self.id,
            topic: self.topic,
            run_dir: self.dir,
            started_at: self.started_at,
            finished_at,
            stages,
            artifacts,
            failures: ledger.failures().to_vec(),
            counts,
        }
    }
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        let _ = std::fs::remove_file(path);
    }
}
