//! Extraction jobs: records, storage, execution and admission.
//!
//! - `JobRecord`: one job's items, counters and lifecycle
//! - `JobStore`: persistence (in-memory or one JSON document per job)
//! - `JobRunner`: runs a job's items over one extraction session
//! - `JobDispatcher`: single-active-job admission and the background worker

pub mod dispatcher;
pub mod runner;
pub mod store;
pub mod types;

pub use dispatcher::{DispatcherStats, JobDispatcher, JobError};
pub use runner::{JobRunner, RunError, RunOutcome, RunnerSettings};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, JsonFileJobStore};
pub use types::{CurrentItem, JobCounters, JobRecord, JobSnapshot, JobStatus, OutputFiles};
