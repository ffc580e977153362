//! Job record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crawlnet_catalog::{Item, normalize_items};
use crawlnet_core::{DomainError, DomainResult, JobId};

use crate::pipeline::SearchPhase;

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for the worker
    Pending,
    /// Owned by the runner
    Running,
    /// Every item has an outcome
    Completed,
    /// Aborted by a session error
    Failed,
    /// Stopped at an item boundary
    Stopped,
}

impl JobStatus {
    /// Pending or running: occupies the single job slot.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

impl JobCounters {
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }

    pub fn is_covered(&self) -> bool {
        self.processed() == self.total
    }
}

/// The item the runner is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentItem {
    /// 1-based position in the job's item list.
    pub index: usize,
    pub sku: String,
    pub name: String,
    pub phase: SearchPhase,
}

/// Result artifact names; unset until written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub results_file: Option<String>,
    pub errors_file: Option<String>,
    pub temp_results_file: Option<String>,
    pub temp_errors_file: Option<String>,
}

/// Persisted state of one extraction job.
///
/// Fields change only through the lifecycle methods below, each of which
/// rejects calls that do not fit the current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    id: JobId,
    status: JobStatus,
    items: Vec<Item>,
    counters: JobCounters,
    current_item: Option<CurrentItem>,
    error: Option<String>,
    output: OutputFiles,
    /// Number of times the job has entered `running`.
    run: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    retried_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a pending job over a validated item list.
    pub fn new(items: Vec<Item>) -> DomainResult<Self> {
        Self::with_id(JobId::new(), items)
    }

    pub fn with_id(id: JobId, items: Vec<Item>) -> DomainResult<Self> {
        let items = normalize_items(items)?;
        let now = Utc::now();
        Ok(Self {
            id,
            status: JobStatus::Pending,
            counters: JobCounters {
                successful: 0,
                failed: 0,
                total: items.len(),
            },
            items,
            current_item: None,
            error: None,
            output: OutputFiles::default(),
            run: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            stopped_at: None,
            failed_at: None,
            retried_at: None,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn counters(&self) -> JobCounters {
        self.counters
    }

    pub fn current_item(&self) -> Option<&CurrentItem> {
        self.current_item.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn output(&self) -> &OutputFiles {
        &self.output
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Percentage of items with an outcome, derived from the counters.
    pub fn progress(&self) -> f64 {
        if self.counters.total == 0 {
            return 0.0;
        }
        self.counters.processed() as f64 / self.counters.total as f64 * 100.0
    }

    fn require(&self, allowed: &[JobStatus], action: &str) -> DomainResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.status, action))
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// pending → running.
    pub fn begin(&mut self) -> DomainResult<()> {
        self.require(&[JobStatus::Pending], "start")?;
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.run += 1;
        self.started_at = Some(now);
        self.current_item = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_current_item(&mut self, index: usize) -> DomainResult<()> {
        self.require(&[JobStatus::Running], "advance")?;
        let item = self
            .items
            .get(index.wrapping_sub(1))
            .ok_or_else(|| DomainError::invariant(format!("item {index} out of range")))?;
        self.current_item = Some(CurrentItem {
            index,
            sku: item.sku.clone(),
            name: item.name.clone(),
            phase: SearchPhase::Starting,
        });
        self.touch();
        Ok(())
    }

    /// Update the current item's phase. No-op when no item is in flight.
    pub fn set_phase(&mut self, phase: SearchPhase) {
        if let Some(current) = self.current_item.as_mut() {
            current.phase = phase;
            self.touch();
        }
    }

    fn record_outcome(&mut self, success: bool) -> DomainResult<()> {
        self.require(&[JobStatus::Running], "record an outcome")?;
        if self.counters.is_covered() {
            return Err(DomainError::invariant(format!(
                "all {} items already have an outcome",
                self.counters.total
            )));
        }
        if success {
            self.counters.successful += 1;
        } else {
            self.counters.failed += 1;
        }
        self.touch();
        Ok(())
    }

    pub fn record_success(&mut self) -> DomainResult<()> {
        self.record_outcome(true)
    }

    pub fn record_failure(&mut self) -> DomainResult<()> {
        self.record_outcome(false)
    }

    /// running → completed; requires every item to have an outcome.
    pub fn complete(&mut self) -> DomainResult<()> {
        self.require(&[JobStatus::Running], "complete")?;
        if !self.counters.is_covered() {
            return Err(DomainError::invariant(format!(
                "only {} of {} items processed",
                self.counters.processed(),
                self.counters.total
            )));
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.current_item = None;
        self.updated_at = now;
        Ok(())
    }

    /// running → stopped.
    pub fn stop(&mut self) -> DomainResult<()> {
        self.require(&[JobStatus::Running], "stop")?;
        let now = Utc::now();
        self.status = JobStatus::Stopped;
        self.stopped_at = Some(now);
        self.current_item = None;
        self.updated_at = now;
        Ok(())
    }

    /// running → failed, keeping outcomes recorded so far.
    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.require(&[JobStatus::Running], "fail")?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.failed_at = Some(now);
        self.current_item = None;
        self.updated_at = now;
        Ok(())
    }

    /// failed|stopped → pending with the original items and zeroed counters.
    pub fn reset_for_retry(&mut self) -> DomainResult<()> {
        self.require(&[JobStatus::Failed, JobStatus::Stopped], "retry")?;
        let now = Utc::now();
        self.status = JobStatus::Pending;
        self.counters.successful = 0;
        self.counters.failed = 0;
        self.current_item = None;
        self.error = None;
        self.output = OutputFiles::default();
        self.started_at = None;
        self.completed_at = None;
        self.stopped_at = None;
        self.failed_at = None;
        self.retried_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Attach a job-level error without changing status.
    pub fn note_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.touch();
    }

    pub fn set_output(&mut self, output: OutputFiles) {
        self.output = output;
        self.touch();
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            status: self.status,
            items: self.items.clone(),
            successful: self.counters.successful,
            failed: self.counters.failed,
            total: self.counters.total,
            progress: self.progress(),
            current_item: self.current_item.clone(),
            error: self.error.clone(),
            results_file: self.output.results_file.clone(),
            errors_file: self.output.errors_file.clone(),
            temp_results_file: self.output.temp_results_file.clone(),
            temp_errors_file: self.output.temp_errors_file.clone(),
            run: self.run,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            stopped_at: self.stopped_at,
            failed_at: self.failed_at,
            retried_at: self.retried_at,
        }
    }
}

/// Read-only copy of a job for pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub items: Vec<Item>,
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub progress: f64,
    pub current_item: Option<CurrentItem>,
    pub error: Option<String>,
    pub results_file: Option<String>,
    pub errors_file: Option<String>,
    pub temp_results_file: Option<String>,
    pub temp_errors_file: Option<String>,
    pub run: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub retried_at: Option<DateTime<Utc>>,
}
