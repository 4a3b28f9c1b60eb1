//! The upload-to-artifacts pipeline.

use super::locks::OutputLocks;
use super::workspace::{apply_retention, clear_stale_artifacts, RequestDirs};
use crate::assembler::ResultAssembler;
use crate::config::StitchConfig;
use crate::core::{ProcessOutcome, StitchArtifacts, UploadBatch};
use crate::errors::{Result, StitchflowError};
use crate::events::{names, payload, EventSink, NoOpEventSink};
use crate::observability::{request_span, SpanTimer};
use crate::runner::{StitcherCommand, SubprocessRunner};
use crate::utils::RequestId;
use crate::watcher::{StabilityCheckResult, StabilityWatcher};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Drives one request through stability check, stitcher run and artifact read.
///
/// The pipeline is cheap to clone and shared by all request handlers. The
/// only state shared between requests is the output lock table.
#[derive(Clone)]
pub struct StitchPipeline {
    config: Arc<StitchConfig>,
    watcher: StabilityWatcher,
    locks: Arc<OutputLocks>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StitchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StitchPipeline")
            .field("config", &self.config)
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

impl StitchPipeline {
    /// Creates a pipeline that discards events.
    #[must_use]
    pub fn new(config: StitchConfig) -> Self {
        let watcher = StabilityWatcher::new(config.stability_timeout())
            .with_poll_interval(config.poll_interval());
        Self {
            config: Arc::new(config),
            watcher,
            locks: Arc::new(OutputLocks::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Directories for `request_id`.
    #[must_use]
    pub fn request_dirs(&self, request_id: RequestId) -> RequestDirs {
        RequestDirs::resolve(&self.config, request_id)
    }

    /// Runs `batch` to completion.
    ///
    /// The stitcher is launched only after every file in the batch is
    /// stable, and artifacts are read only after it exits with code 0.
    /// Staged files are then handled per the retention policy, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Any [`StitchflowError`] raised along the way, with process failures
    /// carrying the classified reason and raw output.
    pub async fn process(&self, batch: UploadBatch) -> Result<StitchArtifacts> {
        let request_id = batch.request_id();
        let span = request_span(request_id, batch.len());
        let dirs = self.request_dirs(request_id);

        let result = self.execute(&batch, &dirs).instrument(span.clone()).await;

        async {
            match &result {
                Ok(artifacts) => {
                    info!(artifacts = artifacts.len(), "stitch request completed");
                    self.emit(
                        request_id,
                        names::PIPELINE_COMPLETED,
                        json!({"artifacts": artifacts.len(), "bytes": artifacts.total_bytes()}),
                    )
                    .await;
                }
                Err(err) => {
                    warn!(code = err.code(), reason = %err.reason(), "stitch request failed");
                    self.emit(
                        request_id,
                        names::PIPELINE_FAILED,
                        json!({"error": err.code(), "reason": err.reason()}),
                    )
                    .await;
                }
            }
            apply_retention(self.config.retention, &dirs, &batch).await;
        }
        .instrument(span)
        .await;

        result
    }

    async fn execute(&self, batch: &UploadBatch, dirs: &RequestDirs) -> Result<StitchArtifacts> {
        let request_id = batch.request_id();
        if batch.is_empty() {
            return Err(StitchflowError::UploadMissing);
        }
        self.emit(
            request_id,
            names::UPLOAD_RECEIVED,
            json!({"files": batch.len(), "staging_dir": batch.staging_dir()}),
        )
        .await;

        let timer = SpanTimer::start("stability");
        let stability = self.watcher.wait_until_stable(&batch.paths()).await;
        match &stability {
            StabilityCheckResult::Ready { rounds, .. } => {
                self.emit(
                    request_id,
                    names::STABILITY_READY,
                    json!({"rounds": rounds, "waited_ms": timer.finish()}),
                )
                .await;
            }
            StabilityCheckResult::TimedOut { pending, .. } => {
                self.emit(
                    request_id,
                    names::STABILITY_TIMEOUT,
                    json!({"pending": pending, "waited_ms": timer.finish()}),
                )
                .await;
            }
        }
        stability.into_result()?;

        dirs.create_output_dir().await?;
        let _guard = if dirs.is_isolated() {
            None
        } else {
            Some(self.locks.acquire(dirs.output_dir()).await)
        };
        clear_stale_artifacts(dirs.output_dir()).await?;

        let command = StitcherCommand::from_config(&self.config, batch.staging_dir(), dirs.output_dir());
        let runner = SubprocessRunner::new(command)
            .with_timeout(self.config.process_timeout())
            .with_output_limit(self.config.max_output_bytes);
        self.emit(
            request_id,
            names::PROCESS_STARTED,
            json!({"command": runner.command().display()}),
        )
        .await;

        let outcome = runner.run().await;
        self.emit(
            request_id,
            names::PROCESS_EXITED,
            json!({"code": outcome.exit_code(), "success": outcome.is_success(), "reason": outcome.reason()}),
        )
        .await;
        if let ProcessOutcome::Success(run) = &outcome {
            if let Some(result) = run.result() {
                self.emit(request_id, names::PROCESS_RESULT, json!({"result": result}))
                    .await;
            }
        }

        let run = outcome.into_result().map_err(StitchflowError::from_process)?;
        let assembler = ResultAssembler::new(dirs.output_dir(), self.config.artifact_plan());
        let artifacts = assembler.assemble(&run).await?;
        self.emit(
            request_id,
            names::ARTIFACTS_LOADED,
            json!({
                "roles": artifacts.roles().map(|r| r.as_str()).collect::<Vec<_>>(),
                "bytes": artifacts.total_bytes(),
            }),
        )
        .await;

        Ok(artifacts)
    }

    async fn emit(&self, request_id: RequestId, event_type: &str, data: serde_json::Value) {
        self.events.emit(event_type, Some(payload(request_id, data))).await;
    }
}
