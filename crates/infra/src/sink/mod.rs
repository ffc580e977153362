//! Result sinks: per-job accumulation of success and failure records.
//!
//! A sink overwrites whole artifacts on every flush, so readers always see a
//! complete, monotonically growing record set.

pub mod csv;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crawlnet_catalog::{FailureRecord, ProductRecord};
use crawlnet_core::JobId;

use crate::pipeline::ItemOutcome;

pub use self::csv::CsvResultWriter;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("invalid artifact name: {0}")]
    InvalidName(String),
    #[error("artifact not found: {0}")]
    NotFound(String),
}

/// Durable destination for the two record streams.
pub trait ResultWriter: Send + Sync {
    /// Replace artifact `name` with `records`; returns the stored name.
    fn write_successes(&self, name: &str, records: &[ProductRecord]) -> Result<String, SinkError>;

    fn write_failures(&self, name: &str, records: &[FailureRecord]) -> Result<String, SinkError>;
}

impl<T: ResultWriter + ?Sized> ResultWriter for Arc<T> {
    fn write_successes(&self, name: &str, records: &[ProductRecord]) -> Result<String, SinkError> {
        (**self).write_successes(name, records)
    }

    fn write_failures(&self, name: &str, records: &[FailureRecord]) -> Result<String, SinkError> {
        (**self).write_failures(name, records)
    }
}

/// Keeps encoded artifacts in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryResultWriter {
    files: Mutex<HashMap<String, String>>,
}

impl InMemoryResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.files.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn store(&self, name: &str, bytes: Vec<u8>) -> Result<String, SinkError> {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.files
            .lock()
            .map_err(|_| SinkError::Io(std::io::Error::other("writer lock poisoned")))?
            .insert(name.to_string(), text);
        Ok(name.to_string())
    }
}

impl ResultWriter for InMemoryResultWriter {
    fn write_successes(&self, name: &str, records: &[ProductRecord]) -> Result<String, SinkError> {
        let mut buf = Vec::new();
        self::csv::encode_successes(&mut buf, records)?;
        self.store(name, buf)
    }

    fn write_failures(&self, name: &str, records: &[FailureRecord]) -> Result<String, SinkError> {
        let mut buf = Vec::new();
        self::csv::encode_failures(&mut buf, records)?;
        self.store(name, buf)
    }
}

pub fn temp_success_name(job_id: JobId) -> String {
    format!("temp_success_{}.csv", job_id.short())
}

pub fn temp_failure_name(job_id: JobId) -> String {
    format!("temp_failed_{}.csv", job_id.short())
}

pub fn final_success_name(job_id: JobId, at: DateTime<Utc>) -> String {
    format!(
        "product_scraping_success_{}_{}.csv",
        job_id.short(),
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

pub fn final_failure_name(job_id: JobId, at: DateTime<Utc>) -> String {
    format!(
        "product_scraping_failed_{}_{}.csv",
        job_id.short(),
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Artifact names produced by an intermediate flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFiles {
    pub successes: Option<String>,
    pub failures: Option<String>,
}

/// Final state of a sink at job termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    pub successes: Vec<ProductRecord>,
    pub failures: Vec<FailureRecord>,
    pub results_file: Option<String>,
    pub errors_file: Option<String>,
}

/// Per-job accumulator of outcomes.
pub struct ResultSink {
    job_id: JobId,
    writer: Arc<dyn ResultWriter>,
    successes: Vec<ProductRecord>,
    failures: Vec<FailureRecord>,
}

impl ResultSink {
    pub fn new(job_id: JobId, writer: Arc<dyn ResultWriter>) -> Self {
        Self {
            job_id,
            writer,
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Success(r) => self.successes.push(r.clone()),
            ItemOutcome::Failure(f) => self.failures.push(f.clone()),
        }
    }

    pub fn successes(&self) -> &[ProductRecord] {
        &self.successes
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the temp artifacts with everything recorded so far.
    pub fn flush_snapshot(&self) -> Result<SnapshotFiles, SinkError> {
        let mut files = SnapshotFiles::default();
        if !self.successes.is_empty() {
            files.successes = Some(
                self.writer
                    .write_successes(&temp_success_name(self.job_id), &self.successes)?,
            );
        }
        if !self.failures.is_empty() {
            files.failures = Some(
                self.writer
                    .write_failures(&temp_failure_name(self.job_id), &self.failures)?,
            );
        }
        Ok(files)
    }

    /// Write the timestamped final artifacts.
    pub fn finalize(&self, at: DateTime<Utc>) -> Result<FinalReport, SinkError> {
        let results_file = if self.successes.is_empty() {
            None
        } else {
            Some(
                self.writer
                    .write_successes(&final_success_name(self.job_id, at), &self.successes)?,
            )
        };
        let errors_file = if self.failures.is_empty() {
            None
        } else {
            Some(
                self.writer
                    .write_failures(&final_failure_name(self.job_id, at), &self.failures)?,
            )
        };

        Ok(FinalReport {
            successes: self.successes.clone(),
            failures: self.failures.clone(),
            results_file,
            errors_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crawlnet_catalog::{MatchOrigin, ProductDetails};

    fn job_id() -> JobId {
        "0190a8c2-7b1e-7cc3-9a55-4d2f1c3b9e10".parse().unwrap()
    }

    fn success(index: usize) -> ItemOutcome {
        ItemOutcome::Success(ProductRecord {
            index,
            product_name: format!("Mug {index}"),
            sku: format!("M{index}"),
            details: ProductDetails::default(),
            product_url: format!("https://shop.example/mug-{index}"),
            origin: MatchOrigin::NameSearch,
        })
    }

    fn failure(index: usize) -> ItemOutcome {
        ItemOutcome::Failure(FailureRecord {
            index,
            product_name: format!("Bowl {index}"),
            sku: format!("B{index}"),
            error: "Product not found after all attempts".into(),
        })
    }

    #[test]
    fn file_names_follow_job_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(temp_success_name(job_id()), "temp_success_0190a8c2.csv");
        assert_eq!(temp_failure_name(job_id()), "temp_failed_0190a8c2.csv");
        assert_eq!(
            final_success_name(job_id(), at),
            "product_scraping_success_0190a8c2_2025-03-09_14-05-07.csv"
        );
        assert_eq!(
            final_failure_name(job_id(), at),
            "product_scraping_failed_0190a8c2_2025-03-09_14-05-07.csv"
        );
    }

    #[test]
    fn snapshot_grows_with_each_flush() {
        let writer = Arc::new(InMemoryResultWriter::new());
        let mut sink = ResultSink::new(job_id(), writer.clone());

        sink.record(&success(1));
        let files = sink.flush_snapshot().unwrap();
        assert_eq!(files.successes.as_deref(), Some("temp_success_0190a8c2.csv"));
        assert_eq!(files.failures, None);

        sink.record(&success(2));
        sink.record(&failure(3));
        sink.flush_snapshot().unwrap();

        let text = writer.contents("temp_success_0190a8c2.csv").unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(writer.contents("temp_failed_0190a8c2.csv").is_some());
    }

    #[test]
    fn finalize_skips_empty_streams() {
        let writer = Arc::new(InMemoryResultWriter::new());
        let mut sink = ResultSink::new(job_id(), writer.clone());
        sink.record(&failure(1));

        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let report = sink.finalize(at).unwrap();

        assert_eq!(report.results_file, None);
        assert_eq!(
            report.errors_file.as_deref(),
            Some("product_scraping_failed_0190a8c2_2025-03-09_14-05-07.csv")
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(writer.names().len(), 1);
    }

    #[test]
    fn empty_sink_writes_nothing() {
        let writer = Arc::new(InMemoryResultWriter::new());
        let sink = ResultSink::new(job_id(), writer.clone());
        assert!(sink.is_empty());
        assert_eq!(sink.flush_snapshot().unwrap(), SnapshotFiles::default());
        assert!(writer.names().is_empty());
    }
}
