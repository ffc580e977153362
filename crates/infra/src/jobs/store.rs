//! Job storage implementations.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crawlnet_core::JobId;

use crate::blocking::offload;

use super::types::JobRecord;

/// Job store abstraction.
///
/// Reads hand out copies; only the runner owning a job writes it while running.
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError>;

    /// Replace a stored job.
    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError>;

    /// Remove a job.
    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// All jobs, most recently created first.
    fn list(&self) -> Result<Vec<JobRecord>, JobStoreError>;

    /// Remove every job, returning how many were removed.
    fn clear(&self) -> Result<usize, JobStoreError>;

    /// Any job that is pending or running.
    fn find_active(&self) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self.list()?.into_iter().find(|j| j.status().is_active()))
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn newest_first(mut jobs: Vec<JobRecord>) -> Vec<JobRecord> {
    jobs.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
    jobs
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, JobRecord>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, JobRecord>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id()) {
            return Err(JobStoreError::AlreadyExists(job.id()));
        }
        jobs.insert(job.id(), job);
        Ok(())
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self.read()?.get(&job_id).cloned())
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        match jobs.get_mut(&job.id()) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id())),
        }
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.write()?
            .remove(&job_id)
            .map(|_| ())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn list(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        Ok(newest_first(self.read()?.values().cloned().collect()))
    }

    fn clear(&self) -> Result<usize, JobStoreError> {
        let mut jobs = self.write()?;
        let n = jobs.len();
        jobs.clear();
        Ok(n)
    }
}

/// Durable store: one `{job_id}.json` document per job.
///
/// Documents are written to a temp file and renamed into place, so a reader
/// never sees a torn record. All documents are loaded into memory on open.
/// Mutations are serialized so a delete cannot race a write back to disk.
#[derive(Debug)]
pub struct JsonFileJobStore {
    dir: PathBuf,
    cache: InMemoryJobStore,
    writes: Mutex<()>,
}

impl JsonFileJobStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| JobStoreError::Storage(format!("create {}: {e}", dir.display())))?;

        let cache = InMemoryJobStore::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| JobStoreError::Storage(format!("read {}: {e}", dir.display())))?;
        for entry in entries {
            let path = entry
                .map_err(|e| JobStoreError::Storage(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document(&path) {
                Ok(job) => cache.insert(job)?,
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job document"),
            }
        }

        Ok(Self {
            dir,
            cache,
            writes: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, JobStoreError> {
        self.writes
            .lock()
            .map_err(|_| JobStoreError::Storage("job store write lock poisoned".into()))
    }

    fn remove_document(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.cache.delete(job_id)?;
        match offload(|| fs::remove_file(self.path_for(job_id))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobStoreError::Storage(e.to_string())),
        }
    }

    fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    fn read_document(path: &Path) -> Result<JobRecord, JobStoreError> {
        let raw = fs::read(path)
            .map_err(|e| JobStoreError::Storage(format!("read {}: {e}", path.display())))?;
        serde_json::from_slice(&raw).map_err(|e| JobStoreError::Serialization(e.to_string()))
    }

    fn write_document(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let body = serde_json::to_vec_pretty(job)
            .map_err(|e| JobStoreError::Serialization(e.to_string()))?;
        let path = self.path_for(job.id());
        let tmp = path.with_extension("json.tmp");
        offload(|| {
            fs::write(&tmp, body)
                .map_err(|e| JobStoreError::Storage(format!("write {}: {e}", tmp.display())))?;
            fs::rename(&tmp, &path)
                .map_err(|e| JobStoreError::Storage(format!("rename {}: {e}", path.display())))
        })
    }
}

impl JobStore for JsonFileJobStore {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        let _guard = self.lock_writes()?;
        if self.cache.get(job.id())?.is_some() {
            return Err(JobStoreError::AlreadyExists(job.id()));
        }
        self.write_document(&job)?;
        self.cache.insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        self.cache.get(job_id)
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let _guard = self.lock_writes()?;
        if self.cache.get(job.id())?.is_none() {
            return Err(JobStoreError::NotFound(job.id()));
        }
        self.write_document(job)?;
        self.cache.update(job)
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let _guard = self.lock_writes()?;
        self.remove_document(job_id)
    }

    fn list(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        self.cache.list()
    }

    fn clear(&self) -> Result<usize, JobStoreError> {
        let _guard = self.lock_writes()?;
        let jobs = self.cache.list()?;
        for job in &jobs {
            self.remove_document(job.id())?;
        }
        Ok(jobs.len())
    }
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete(job_id)
    }

    fn list(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        (**self).list()
    }

    fn clear(&self) -> Result<usize, JobStoreError> {
        (**self).clear()
    }

    fn find_active(&self) -> Result<Option<JobRecord>, JobStoreError> {
        (**self).find_active()
    }
}
