//! Sequential execution of one job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crawlnet_core::{DomainError, JobId};

use crate::adapter::{AdapterError, ExtractionAdapter, SessionFactory};
use crate::pipeline::{ItemOutcome, PipelineError, ProductSearchPipeline, ProgressObserver, SearchPhase};
use crate::sink::{ResultSink, ResultWriter};

use super::store::{JobStore, JobStoreError};
use super::types::{JobRecord, JobSnapshot, JobStatus, OutputFiles};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Attempts to open the extraction session before the job fails.
    pub session_attempts: u32,
    pub session_backoff: Duration,
    /// Pause after each item.
    pub item_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            session_attempts: 3,
            session_backoff: Duration::from_secs(5),
            item_delay: Duration::from_secs(2),
        }
    }
}

impl RunnerSettings {
    /// No waits anywhere; for tests.
    pub fn immediate() -> Self {
        Self {
            session_attempts: 3,
            session_backoff: Duration::ZERO,
            item_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// How a call to [`JobRunner::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The job reached a terminal status.
    Finished(JobSnapshot),
    /// The record was deleted before or during the run.
    Deleted,
    /// The job was not pending when the worker picked it up.
    Skipped(JobStatus),
}

enum SessionSetup {
    Ready(Box<dyn ExtractionAdapter>),
    Cancelled,
    Failed(AdapterError),
}

enum LoopEnd {
    Covered,
    Cancelled,
    SessionLost(String),
    Deleted,
}

/// Writes phase changes through to the store so pollers can follow along.
struct StoreProgress<'a, S: JobStore> {
    store: &'a S,
    job: &'a mut JobRecord,
}

impl<S: JobStore> ProgressObserver for StoreProgress<'_, S> {
    fn on_phase(&mut self, phase: &SearchPhase) {
        self.job.set_phase(phase.clone());
        if let Err(e) = self.store.update(self.job) {
            debug!(job_id = %self.job.id(), error = %e, "phase update not persisted");
        }
    }
}

/// Runs a job's items through the pipeline over one exclusive session.
///
/// The runner is the only writer of a job record while it is running.
pub struct JobRunner<S: JobStore> {
    store: S,
    sessions: Arc<dyn SessionFactory>,
    pipeline: ProductSearchPipeline,
    writer: Arc<dyn ResultWriter>,
    settings: RunnerSettings,
}

impl<S: JobStore> JobRunner<S> {
    pub fn new(
        store: S,
        sessions: Arc<dyn SessionFactory>,
        pipeline: ProductSearchPipeline,
        writer: Arc<dyn ResultWriter>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            pipeline,
            writer,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a pending job to a terminal status.
    ///
    /// `cancel` is checked before session setup, during its backoff and
    /// before every item; an item in progress always finishes.
    pub async fn run(
        &self,
        job_id: JobId,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let Some(mut job) = self.store.get(job_id)? else {
            return Ok(RunOutcome::Deleted);
        };
        if job.status() != JobStatus::Pending {
            debug!(job_id = %job_id, status = %job.status(), "job no longer pending, skipping");
            return Ok(RunOutcome::Skipped(job.status()));
        }

        job.begin()?;
        if !self.persist(&job)? {
            return Ok(RunOutcome::Deleted);
        }
        info!(job_id = %job_id, items = job.counters().total, run = job.run(), "job started");

        let session = match self.open_session(job_id, cancel).await {
            SessionSetup::Ready(session) => session,
            SessionSetup::Cancelled => {
                info!(job_id = %job_id, "stop observed before session setup");
                job.stop()?;
                if !self.persist(&job)? {
                    return Ok(RunOutcome::Deleted);
                }
                return Ok(RunOutcome::Finished(job.snapshot()));
            }
            SessionSetup::Failed(e) => {
                job.fail(format!(
                    "Failed to set up extraction session after {} attempts: {e}",
                    self.settings.session_attempts
                ))?;
                if !self.persist(&job)? {
                    return Ok(RunOutcome::Deleted);
                }
                warn!(job_id = %job_id, error = %e, "job failed during session setup");
                return Ok(RunOutcome::Finished(job.snapshot()));
            }
        };

        let mut sink = ResultSink::new(job_id, self.writer.clone());
        let result = self
            .process_items(&mut job, session.as_ref(), &mut sink, cancel)
            .await;

        if let Err(e) = session.close().await {
            warn!(job_id = %job_id, error = %e, "failed to close extraction session");
        }

        match result? {
            LoopEnd::Covered => job.complete()?,
            LoopEnd::Cancelled => job.stop()?,
            LoopEnd::SessionLost(msg) => job.fail(msg)?,
            LoopEnd::Deleted => {
                info!(job_id = %job_id, "job deleted while running");
                return Ok(RunOutcome::Deleted);
            }
        }

        match sink.finalize(Utc::now()) {
            Ok(report) => {
                let mut output = job.output().clone();
                output.results_file = report.results_file;
                output.errors_file = report.errors_file;
                job.set_output(output);
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to write final results");
                job.note_error(format!("Failed to write result files: {e}"));
            }
        }

        if !self.persist(&job)? {
            return Ok(RunOutcome::Deleted);
        }

        let counters = job.counters();
        info!(
            job_id = %job_id,
            status = %job.status(),
            successful = counters.successful,
            failed = counters.failed,
            total = counters.total,
            "job finished"
        );
        Ok(RunOutcome::Finished(job.snapshot()))
    }

    async fn open_session(&self, job_id: JobId, cancel: &CancellationToken) -> SessionSetup {
        let attempts = self.settings.session_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return SessionSetup::Cancelled;
            }
            match self.sessions.open().await {
                Ok(session) => return SessionSetup::Ready(session),
                Err(e) => {
                    warn!(job_id = %job_id, attempt, error = %e, "session setup attempt failed");
                    last = Some(e);
                    if attempt < attempts && !self.settings.session_backoff.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return SessionSetup::Cancelled,
                            _ = tokio::time::sleep(self.settings.session_backoff) => {}
                        }
                    }
                }
            }
        }

        SessionSetup::Failed(last.unwrap_or_else(|| AdapterError::Setup("no attempts made".into())))
    }

    async fn process_items(
        &self,
        job: &mut JobRecord,
        session: &dyn ExtractionAdapter,
        sink: &mut ResultSink,
        cancel: &CancellationToken,
    ) -> Result<LoopEnd, RunError> {
        let items = job.items().to_vec();

        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                info!(job_id = %job.id(), next_item = index, "stop observed");
                return Ok(LoopEnd::Cancelled);
            }

            job.set_current_item(index)?;
            if !self.persist(job)? {
                return Ok(LoopEnd::Deleted);
            }
            debug!(job_id = %job.id(), index, sku = %item.sku, name = %item.name, "processing item");

            let outcome = {
                let mut progress = StoreProgress {
                    store: &self.store,
                    job: &mut *job,
                };
                self.pipeline.run(session, index, item, &mut progress).await
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(PipelineError::Session(msg)) => {
                    warn!(job_id = %job.id(), index, error = %msg, "session lost mid-job");
                    return Ok(LoopEnd::SessionLost(msg));
                }
            };

            sink.record(&outcome);
            match outcome {
                ItemOutcome::Success(_) => job.record_success()?,
                ItemOutcome::Failure(_) => job.record_failure()?,
            }

            match sink.flush_snapshot() {
                Ok(files) => {
                    let output = OutputFiles {
                        temp_results_file: files.successes,
                        temp_errors_file: files.failures,
                        ..job.output().clone()
                    };
                    job.set_output(output);
                }
                Err(e) => warn!(job_id = %job.id(), error = %e, "failed to flush result snapshot"),
            }

            // The last outcome is persisted together with the completed status.
            if job.counters().is_covered() {
                return Ok(LoopEnd::Covered);
            }
            if !self.persist(job)? {
                return Ok(LoopEnd::Deleted);
            }

            if !self.settings.item_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.item_delay) => {}
                }
            }
        }

        Ok(LoopEnd::Covered)
    }

    /// Write the record; `false` when it has been deleted underneath us.
    fn persist(&self, job: &JobRecord) -> Result<bool, RunError> {
        match self.store.update(job) {
            Ok(()) => Ok(true),
            Err(JobStoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
