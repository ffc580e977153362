//! Admission, queueing and lifecycle control for extraction jobs.
//!
//! At most one job is pending or running at a time. Submissions that would
//! break that rule are rejected with [`JobError::Conflict`]. A single worker
//! task drains the queue and hands each job to the [`JobRunner`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crawlnet_catalog::Item;
use crawlnet_core::{DomainError, JobId};

use super::runner::{JobRunner, RunOutcome};
use super::store::{JobStore, JobStoreError};
use super::types::{JobRecord, JobSnapshot, JobStatus};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {active} is already {status}; stop it or wait for it to finish")]
    Conflict { active: JobId, status: JobStatus },
    #[error("job {job_id}: {source}")]
    Domain {
        job_id: JobId,
        #[source]
        source: DomainError,
    },
    #[error("invalid job: {0}")]
    Validation(DomainError),
    #[error("dispatcher is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Store(JobStoreError),
}

impl From<JobStoreError> for JobError {
    fn from(e: JobStoreError) -> Self {
        match e {
            JobStoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Store(other),
        }
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_stopped: u64,
    pub current_job: Option<JobId>,
    pub uptime_secs: u64,
}

struct QueuedJob {
    id: JobId,
    generation: u64,
    cancel: CancellationToken,
}

struct Registered {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Tokens {
    next_generation: u64,
    by_job: HashMap<JobId, Registered>,
}

/// Per-job cancellation tokens, all children of the dispatcher's shutdown
/// token.
#[derive(Default)]
struct CancelRegistry {
    shutdown: CancellationToken,
    tokens: Mutex<Tokens>,
}

impl CancelRegistry {
    fn tokens(&self) -> MutexGuard<'_, Tokens> {
        self.tokens.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn register(&self, id: JobId) -> (u64, CancellationToken) {
        let token = self.shutdown.child_token();
        let mut tokens = self.tokens();
        tokens.next_generation += 1;
        let generation = tokens.next_generation;
        tokens.by_job.insert(
            id,
            Registered {
                generation,
                token: token.clone(),
            },
        );
        (generation, token)
    }

    fn cancel(&self, id: JobId) -> bool {
        match self.tokens().by_job.get(&id) {
            Some(registered) => {
                registered.token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        for registered in self.tokens().by_job.values() {
            registered.token.cancel();
        }
    }

    /// Drop `id`'s token unless it has been replaced by a newer run.
    fn release(&self, id: JobId, generation: u64) {
        let mut tokens = self.tokens();
        if tokens.by_job.get(&id).is_some_and(|r| r.generation == generation) {
            tokens.by_job.remove(&id);
        }
    }

    fn forget(&self, id: JobId) {
        self.tokens().by_job.remove(&id);
    }

    fn clear(&self) {
        self.tokens().by_job.clear();
    }
}

struct Shared<S: JobStore> {
    runner: JobRunner<S>,
    cancels: CancelRegistry,
    stats: Mutex<DispatcherStats>,
}

impl<S: JobStore> Shared<S> {
    fn stats(&self) -> MutexGuard<'_, DispatcherStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Front door for job operations; owns the background worker.
pub struct JobDispatcher<S: JobStore + 'static> {
    shared: Arc<Shared<S>>,
    queue: mpsc::UnboundedSender<QueuedJob>,
    /// Serializes the find-active check with the write that claims the slot.
    admission: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: JobStore + 'static> JobDispatcher<S> {
    /// Recover persisted jobs and spawn the worker. Must be called inside a
    /// Tokio runtime.
    ///
    /// Jobs left `running` by a previous process are marked failed; `pending`
    /// jobs are queued again, oldest first.
    pub fn start(runner: JobRunner<S>) -> Result<Self, JobError> {
        let shared = Arc::new(Shared {
            runner,
            cancels: CancelRegistry::default(),
            stats: Mutex::new(DispatcherStats::default()),
        });
        let (queue, rx) = mpsc::unbounded_channel();

        let mut recovered = Vec::new();
        for mut job in shared.runner.store().list()? {
            match job.status() {
                JobStatus::Running => {
                    job.fail("Interrupted: the service restarted while the job was running")
                        .map_err(|source| JobError::Domain { job_id: job.id(), source })?;
                    shared.runner.store().update(&job)?;
                    warn!(job_id = %job.id(), "marked interrupted job as failed");
                }
                JobStatus::Pending => recovered.push(job),
                _ => {}
            }
        }
        recovered.reverse();
        for job in &recovered {
            let (generation, cancel) = shared.cancels.register(job.id());
            queue
                .send(QueuedJob {
                    id: job.id(),
                    generation,
                    cancel,
                })
                .map_err(|_| JobError::ShuttingDown)?;
            info!(job_id = %job.id(), "re-queued pending job");
        }

        let worker = tokio::spawn(worker_loop(shared.clone(), rx));

        Ok(Self {
            shared,
            queue,
            admission: Mutex::new(()),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn store(&self) -> &S {
        self.shared.runner.store()
    }

    fn admit(&self) -> Result<MutexGuard<'_, ()>, JobError> {
        if self.shared.cancels.shutdown.is_cancelled() {
            return Err(JobError::ShuttingDown);
        }
        let guard = self.admission.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(active) = self.store().find_active()? {
            return Err(JobError::Conflict {
                active: active.id(),
                status: active.status(),
            });
        }
        Ok(guard)
    }

    fn enqueue(&self, id: JobId) -> Result<(), JobError> {
        let (generation, cancel) = self.shared.cancels.register(id);
        self.queue
            .send(QueuedJob {
                id,
                generation,
                cancel,
            })
            .map_err(|_| JobError::ShuttingDown)
    }

    /// Create a pending job over `items` and queue it.
    pub fn submit(&self, items: Vec<Item>) -> Result<JobSnapshot, JobError> {
        let job = JobRecord::new(items).map_err(JobError::Validation)?;
        let _guard = self.admit()?;

        let snapshot = job.snapshot();
        self.store().insert(job)?;
        self.enqueue(snapshot.job_id)?;

        info!(job_id = %snapshot.job_id, items = snapshot.total, "job submitted");
        Ok(snapshot)
    }

    pub fn status(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.store()
            .get(id)?
            .map(|j| j.snapshot())
            .ok_or(JobError::NotFound(id))
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Result<Vec<JobSnapshot>, JobError> {
        Ok(self.store().list()?.iter().map(JobRecord::snapshot).collect())
    }

    /// Ask an active job to stop at its next item boundary.
    ///
    /// Returns the snapshot as of the request; the status changes once the
    /// runner observes the cancellation.
    pub fn stop(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let job = self.store().get(id)?.ok_or(JobError::NotFound(id))?;
        if !job.status().is_active() {
            return Err(JobError::Domain {
                job_id: id,
                source: DomainError::invalid_transition(job.status(), "stop"),
            });
        }
        if !self.shared.cancels.cancel(id) {
            warn!(job_id = %id, "no cancellation handle for active job");
        }
        info!(job_id = %id, status = %job.status(), "stop requested");
        Ok(job.snapshot())
    }

    /// Re-queue a failed or stopped job with its original items.
    pub fn retry(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        let mut job = self.store().get(id)?.ok_or(JobError::NotFound(id))?;
        job.reset_for_retry()
            .map_err(|source| JobError::Domain { job_id: id, source })?;

        let _guard = self.admit()?;
        self.store().update(&job)?;
        self.enqueue(id)?;

        info!(job_id = %id, items = job.counters().total, "job queued for retry");
        Ok(job.snapshot())
    }

    /// Remove a job record. A running job is told to stop first.
    pub fn delete(&self, id: JobId) -> Result<(), JobError> {
        self.shared.cancels.cancel(id);
        self.store().delete(id)?;
        self.shared.cancels.forget(id);
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Remove every job record, returning how many were removed.
    pub fn clear(&self) -> Result<usize, JobError> {
        self.shared.cancels.cancel_all();
        let removed = self.store().clear()?;
        self.shared.cancels.clear();
        info!(removed, "jobs cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> DispatcherStats {
        self.shared.stats().clone()
    }

    /// Poll until the job reaches a terminal status or `timeout` elapses;
    /// returns the last snapshot seen either way.
    pub async fn wait_until_terminal(
        &self,
        id: JobId,
        timeout: Duration,
    ) -> Result<JobSnapshot, JobError> {
        let deadline = Instant::now() + timeout;
        loop {
            let snap = self.status(id)?;
            if snap.status.is_terminal() || Instant::now() >= deadline {
                return Ok(snap);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop accepting work, ask the running job to stop and wait for the
    /// worker to exit. Jobs still in the queue stay pending for the next
    /// start.
    pub async fn shutdown(&self) {
        self.shared.cancels.shutdown.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "job worker panicked");
            }
        }
        info!("job dispatcher stopped");
    }
}

async fn worker_loop<S: JobStore + 'static>(
    shared: Arc<Shared<S>>,
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
) {
    info!("job worker started");
    let started = Instant::now();
    let shutdown = shared.cancels.shutdown.clone();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(queued) = next else { break };
        if shutdown.is_cancelled() {
            break;
        }

        shared.stats().current_job = Some(queued.id);
        let status = run_contained(&shared, &queued).await;
        shared.cancels.release(queued.id, queued.generation);

        let mut stats = shared.stats();
        stats.current_job = None;
        stats.uptime_secs = started.elapsed().as_secs();
        if let Some(status) = status {
            stats.jobs_processed += 1;
            match status {
                JobStatus::Completed => stats.jobs_completed += 1,
                JobStatus::Failed => stats.jobs_failed += 1,
                JobStatus::Stopped => stats.jobs_stopped += 1,
                JobStatus::Pending | JobStatus::Running => {}
            }
        }
    }

    info!("job worker stopped");
}

/// Run one job on its own task so a panic cannot take the worker down.
/// Returns the terminal status when the job ran.
async fn run_contained<S: JobStore + 'static>(
    shared: &Arc<Shared<S>>,
    queued: &QueuedJob,
) -> Option<JobStatus> {
    let task_shared = shared.clone();
    let id = queued.id;
    let cancel = queued.cancel.clone();
    let handle = tokio::spawn(async move { task_shared.runner.run(id, &cancel).await });

    match handle.await {
        Ok(Ok(RunOutcome::Finished(snap))) => Some(snap.status),
        Ok(Ok(RunOutcome::Skipped(status))) => {
            debug!(job_id = %id, status = %status, "skipped queued job");
            None
        }
        Ok(Ok(RunOutcome::Deleted)) => None,
        Ok(Err(e)) => {
            error!(job_id = %id, error = %e, "job run aborted");
            mark_failed(shared.runner.store(), id, &format!("Job aborted: {e}"))
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "job run panicked");
            mark_failed(shared.runner.store(), id, "Job aborted: the runner panicked")
        }
    }
}

/// Move a job that the runner abandoned into `failed` so it frees the slot.
fn mark_failed<S: JobStore>(store: &S, id: JobId, message: &str) -> Option<JobStatus> {
    let mut job = match store.get(id) {
        Ok(Some(job)) => job,
        Ok(None) => return None,
        Err(e) => {
            error!(job_id = %id, error = %e, "cannot load abandoned job");
            return None;
        }
    };
    if job.status() == JobStatus::Pending && job.begin().is_err() {
        return None;
    }
    if job.fail(message).is_err() {
        return Some(job.status());
    }
    match store.update(&job) {
        Ok(()) => Some(JobStatus::Failed),
        Err(e) => {
            error!(job_id = %id, error = %e, "cannot persist failed job");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::jobs::runner::RunnerSettings;
    use crate::jobs::store::InMemoryJobStore;
    use crate::pipeline::{ProductSearchPipeline, SearchPlan};
    use crate::sink::InMemoryResultWriter;
    use crate::test_support::{ScriptedAdapter, ScriptedFactory};

    const WAIT: Duration = Duration::from_secs(5);

    fn dispatcher_with(
        store: Arc<InMemoryJobStore>,
        adapter: ScriptedAdapter,
    ) -> JobDispatcher<Arc<InMemoryJobStore>> {
        let runner = JobRunner::new(
            store,
            Arc::new(ScriptedFactory::new(adapter)),
            ProductSearchPipeline::new(SearchPlan::default().with_backoff(Duration::ZERO)),
            Arc::new(InMemoryResultWriter::new()),
            RunnerSettings::immediate(),
        );
        JobDispatcher::start(runner).unwrap()
    }

    fn mug() -> Vec<Item> {
        vec![Item::new("B2", "Blue Mug")]
    }

    fn adapter() -> ScriptedAdapter {
        ScriptedAdapter::new().with_product("B2", "Blue Mug", "https://shop.example/blue-mug")
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());

        let snap = d.submit(mug()).unwrap();
        assert_eq!(snap.status, JobStatus::Pending);

        let done = d.wait_until_terminal(snap.job_id, WAIT).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.successful, 1);

        let stats = d.stats();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.current_job, None);
        d.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_items_are_rejected() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());
        assert!(matches!(d.submit(Vec::new()), Err(JobError::Validation(_))));
        assert!(matches!(
            d.submit(vec![Item::new("  ", "Blue Mug")]),
            Err(JobError::Validation(_))
        ));
        assert!(d.list().unwrap().is_empty());
        d.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());
        let id = JobId::new();
        assert!(matches!(d.status(id), Err(JobError::NotFound(_))));
        assert!(matches!(d.stop(id), Err(JobError::NotFound(_))));
        assert!(matches!(d.retry(id), Err(JobError::NotFound(_))));
        assert!(matches!(d.delete(id), Err(JobError::NotFound(_))));
        d.shutdown().await;
    }

    #[tokio::test]
    async fn stopping_a_finished_job_is_rejected() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());
        let id = d.submit(mug()).unwrap().job_id;
        d.wait_until_terminal(id, WAIT).await.unwrap();

        let err = d.stop(id).unwrap_err();
        assert!(matches!(
            err,
            JobError::Domain { source: DomainError::InvalidTransition { .. }, .. }
        ));
        assert!(matches!(d.retry(id), Err(JobError::Domain { .. })));
        d.shutdown().await;
    }

    #[tokio::test]
    async fn restart_recovers_persisted_jobs() {
        let store = InMemoryJobStore::arc();
        let mut interrupted = JobRecord::new(mug()).unwrap();
        interrupted.begin().unwrap();
        let pending = JobRecord::new(mug()).unwrap();
        store.insert(interrupted.clone()).unwrap();
        store.insert(pending.clone()).unwrap();

        let d = dispatcher_with(store.clone(), adapter());

        let failed = d.status(interrupted.id()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("Interrupted"));

        let done = d.wait_until_terminal(pending.id(), WAIT).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        d.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());
        d.shutdown().await;
        assert!(matches!(d.submit(mug()), Err(JobError::ShuttingDown)));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let d = dispatcher_with(InMemoryJobStore::arc(), adapter());
        let id = d.submit(mug()).unwrap().job_id;
        d.wait_until_terminal(id, WAIT).await.unwrap();
        assert_eq!(d.clear().unwrap(), 1);
        assert!(d.list().unwrap().is_empty());
        d.shutdown().await;
    }

    #[test]
    fn registry_release_keeps_newer_token() {
        let registry = CancelRegistry::default();
        let id = JobId::new();
        let (old_generation, old) = registry.register(id);
        let (new_generation, new) = registry.register(id);

        registry.release(id, old_generation);
        assert!(registry.cancel(id));
        assert!(new.is_cancelled());
        assert!(!old.is_cancelled());

        registry.release(id, new_generation);
        assert!(!registry.cancel(id));
    }

    #[test]
    fn shutdown_reaches_every_registered_token() {
        let registry = CancelRegistry::default();
        let (_, queued) = registry.register(JobId::new());
        let (_, dequeued) = registry.register(JobId::new());

        registry.shutdown.cancel();

        assert!(queued.is_cancelled());
        assert!(dequeued.is_cancelled());
        let (_, late) = registry.register(JobId::new());
        assert!(late.is_cancelled());
    }
}
