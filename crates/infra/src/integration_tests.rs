//! End-to-end job tests: dispatcher → runner → pipeline → sink.
//!
//! Verifies:
//! - At most one job is pending or running
//! - Every completed job has an outcome per item, and progress only reaches
//!   100 on completion
//! - Retry reproduces the item list with fresh counters
//! - Stop is honoured at the next item boundary

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crawlnet_catalog::{Item, MatchOrigin};
use crawlnet_core::JobId;

use crate::jobs::{
    InMemoryJobStore, JobDispatcher, JobError, JobRecord, JobRunner, JobSnapshot, JobStatus,
    JobStore, JobStoreError, RunnerSettings,
};
use crate::pipeline::{ProductSearchPipeline, SearchPlan};
use crate::sink::InMemoryResultWriter;
use crate::test_support::{ScriptedAdapter, ScriptedFactory, page};

const WAIT: Duration = Duration::from_secs(5);
const BASE: &str = "https://shop.example";

/// Store that keeps a snapshot of every successful update.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryJobStore,
    history: Mutex<Vec<JobSnapshot>>,
}

impl RecordingStore {
    fn history(&self, id: JobId) -> Vec<JobSnapshot> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.job_id == id)
            .cloned()
            .collect()
    }
}

impl JobStore for RecordingStore {
    fn insert(&self, job: JobRecord) -> Result<(), JobStoreError> {
        self.inner.insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        self.inner.get(job_id)
    }

    fn update(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        self.inner.update(job)?;
        self.history.lock().unwrap().push(job.snapshot());
        Ok(())
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.inner.delete(job_id)
    }

    fn list(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        self.inner.list()
    }

    fn clear(&self) -> Result<usize, JobStoreError> {
        self.inner.clear()
    }
}

struct Fixture<S: JobStore + 'static> {
    dispatcher: JobDispatcher<S>,
    factory: Arc<ScriptedFactory>,
    writer: Arc<InMemoryResultWriter>,
}

fn fixture<S: JobStore + 'static>(store: S, factory: ScriptedFactory) -> Fixture<S> {
    let factory = Arc::new(factory);
    let writer = Arc::new(InMemoryResultWriter::new());
    let runner = JobRunner::new(
        store,
        factory.clone(),
        ProductSearchPipeline::new(
            SearchPlan::default()
                .with_backoff(Duration::ZERO)
                .with_fallback_base_url(BASE),
        ),
        writer.clone(),
        RunnerSettings::immediate(),
    );
    Fixture {
        dispatcher: JobDispatcher::start(runner).unwrap(),
        factory,
        writer,
    }
}

fn catalog() -> ScriptedAdapter {
    ScriptedAdapter::new()
        .with_product("A1", "Red Mug", &format!("{BASE}/red-mug"))
        .with_product("B2", "Blue Mug", &format!("{BASE}/blue-mug"))
        .with_product("C3", "Green Mug", &format!("{BASE}/green-mug"))
}

fn mugs() -> Vec<Item> {
    vec![
        Item::new("A1", "Red Mug"),
        Item::new("B2", "Blue Mug"),
        Item::new("C3", "Green Mug"),
    ]
}

async fn wait_for_item<S: JobStore>(d: &JobDispatcher<S>, id: JobId, index: usize) {
    let deadline = Instant::now() + WAIT;
    loop {
        let snap = d.status(id).unwrap();
        if snap.current_item.as_ref().is_some_and(|c| c.index == index) {
            return;
        }
        assert!(Instant::now() < deadline, "job never reached item {index}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn second_submission_conflicts_while_first_is_active() {
    let gate = Arc::new(Notify::new());
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(catalog().with_gate("A1", gate.clone())),
    );

    let first = f.dispatcher.submit(mugs()).unwrap().job_id;
    let err = f.dispatcher.submit(mugs()).unwrap_err();
    assert!(matches!(err, JobError::Conflict { active, .. } if active == first));
    assert_eq!(f.dispatcher.list().unwrap().len(), 1);

    gate.notify_one();
    let done = f.dispatcher.wait_until_terminal(first, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let second = f.dispatcher.submit(vec![Item::new("B2", "Blue Mug")]).unwrap();
    assert_ne!(second.job_id, first);
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn completed_job_covers_every_item_with_monotonic_progress() {
    let store = Arc::new(RecordingStore::default());
    let f = fixture(store.clone(), ScriptedFactory::new(catalog()));

    let mut items = mugs();
    items.push(Item::new("Z9", "Unknown Teapot"));
    let id = f.dispatcher.submit(items).unwrap().job_id;
    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!((done.successful, done.failed, done.total), (3, 1, 4));
    assert_eq!(done.successful + done.failed, done.total);

    let history = store.history(id);
    assert!(!history.is_empty());
    for pair in history.windows(2) {
        assert!(pair[0].progress <= pair[1].progress, "progress went backwards");
    }
    for snap in &history {
        assert_eq!(
            snap.progress == 100.0,
            snap.status == JobStatus::Completed,
            "progress {} with status {}",
            snap.progress,
            snap.status
        );
    }

    let results = f.writer.contents(done.results_file.as_deref().unwrap()).unwrap();
    let rows = csv::Reader::from_reader(results.as_bytes()).records().count();
    assert_eq!(rows, 3);
    let errors = f.writer.contents(done.errors_file.as_deref().unwrap()).unwrap();
    assert!(errors.contains("Unknown Teapot"));
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn item_found_by_name_records_name_search_origin() {
    let url = format!("{BASE}/sage-linen-cushion");
    let adapter = ScriptedAdapter::new()
        .with_results("Sage Linen Cushion", vec![("Sage Linen Cushion", url.as_str())])
        .with_page(page(&url, "Sage Linen Cushion"));
    let f = fixture(InMemoryJobStore::arc(), ScriptedFactory::new(adapter));

    let id = f
        .dispatcher
        .submit(vec![Item::new("HB-1042", "Sage Linen Cushion")])
        .unwrap()
        .job_id;
    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.successful, 1);
    assert_eq!(f.factory.adapter().search_calls("HB-1042"), 3);
    let csv = f.writer.contents(done.results_file.as_deref().unwrap()).unwrap();
    assert!(csv.contains(MatchOrigin::NameSearch.as_str()));
    assert!(csv.contains("HB-1042"));
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn item_found_only_by_derived_url() {
    let adapter = ScriptedAdapter::new()
        .with_page(page(&format!("{BASE}/oak-serving-board"), "Oak Serving Board"));
    let f = fixture(InMemoryJobStore::arc(), ScriptedFactory::new(adapter));

    let id = f
        .dispatcher
        .submit(vec![Item::new("WD-7", "Oak Serving Board")])
        .unwrap()
        .job_id;
    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.successful, 1);
    assert_eq!(f.factory.adapter().search_calls("WD-7"), 3);
    assert_eq!(f.factory.adapter().search_calls("Oak Serving Board"), 3);
    let csv = f.writer.contents(done.results_file.as_deref().unwrap()).unwrap();
    assert!(csv.contains("https://shop.example/oak-serving-board"));
    assert!(csv.contains(MatchOrigin::DerivedUrl.as_str()));
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn stop_during_first_item_ends_after_it() {
    let gate = Arc::new(Notify::new());
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(catalog().with_gate("A1", gate.clone())),
    );

    let id = f.dispatcher.submit(mugs()).unwrap().job_id;
    wait_for_item(&f.dispatcher, id, 1).await;

    let requested = f.dispatcher.stop(id).unwrap();
    assert_eq!(requested.status, JobStatus::Running);
    gate.notify_one();

    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Stopped);
    assert_eq!((done.successful, done.failed, done.total), (1, 0, 3));
    assert!(done.current_item.is_none());
    assert!(done.results_file.is_some());
    assert_eq!(f.factory.adapter().search_calls("B2"), 0);
    assert_eq!(f.factory.adapter().closes(), 1);
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn retry_reruns_original_items_with_fresh_counters() {
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(catalog()).failing_opens(3),
    );

    let submitted = f.dispatcher.submit(mugs()).unwrap();
    let id = submitted.job_id;
    let failed = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.is_some());

    let retried = f.dispatcher.retry(id).unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.items, submitted.items);
    assert_eq!((retried.successful, retried.failed), (0, 0));
    assert!(retried.error.is_none());

    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.successful, 3);
    assert_eq!(done.run, 2);
    assert!(done.retried_at.is_some());
    assert_eq!(done.created_at, submitted.created_at);
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn retry_of_stopped_job_conflicts_with_active_job() {
    let gate_a = Arc::new(Notify::new());
    let gate_c = Arc::new(Notify::new());
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(
            catalog()
                .with_gate("A1", gate_a.clone())
                .with_gate("C3", gate_c.clone()),
        ),
    );

    let first = f.dispatcher.submit(mugs()).unwrap().job_id;
    wait_for_item(&f.dispatcher, first, 1).await;
    f.dispatcher.stop(first).unwrap();
    gate_a.notify_one();
    let stopped = f.dispatcher.wait_until_terminal(first, WAIT).await.unwrap();
    assert_eq!(stopped.status, JobStatus::Stopped);

    let second = f.dispatcher.submit(vec![Item::new("C3", "Green Mug")]).unwrap().job_id;
    let err = f.dispatcher.retry(first).unwrap_err();
    assert!(matches!(err, JobError::Conflict { active, .. } if active == second));
    assert_eq!(f.dispatcher.status(first).unwrap().status, JobStatus::Stopped);

    gate_c.notify_one();
    f.dispatcher.wait_until_terminal(second, WAIT).await.unwrap();
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn deleting_a_running_job_frees_the_slot() {
    let gate = Arc::new(Notify::new());
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(catalog().with_gate("A1", gate.clone())),
    );

    let id = f.dispatcher.submit(mugs()).unwrap().job_id;
    wait_for_item(&f.dispatcher, id, 1).await;
    f.dispatcher.delete(id).unwrap();
    assert!(matches!(f.dispatcher.status(id), Err(JobError::NotFound(_))));
    gate.notify_one();

    let next = f.dispatcher.submit(vec![Item::new("B2", "Blue Mug")]).unwrap().job_id;
    let done = f.dispatcher.wait_until_terminal(next, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(matches!(f.dispatcher.status(id), Err(JobError::NotFound(_))));
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_running_job_at_its_next_item() {
    let gate = Arc::new(Notify::new());
    let f = fixture(
        InMemoryJobStore::arc(),
        ScriptedFactory::new(catalog().with_gate("A1", gate.clone())),
    );

    let id = f.dispatcher.submit(mugs()).unwrap().job_id;
    wait_for_item(&f.dispatcher, id, 1).await;
    tokio::join!(f.dispatcher.shutdown(), async { gate.notify_one() });

    let done = f.dispatcher.status(id).unwrap();
    assert_eq!(done.status, JobStatus::Stopped);
    assert_eq!((done.successful, done.failed), (1, 0));
    assert_eq!(f.factory.adapter().search_calls("B2"), 0);
    assert_eq!(f.factory.adapter().closes(), 1);
    assert!(matches!(
        f.dispatcher.submit(vec![Item::new("B2", "Blue Mug")]),
        Err(JobError::ShuttingDown)
    ));
}

fn column(reader: &mut csv::Reader<&[u8]>, name: &str) -> usize {
    reader
        .headers()
        .unwrap()
        .iter()
        .position(|h| h == name)
        .unwrap_or_else(|| panic!("missing column {name}"))
}

fn skus_and_origins(csv: &str) -> Vec<(String, String)> {
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let sku = column(&mut reader, "SKU");
    let origin = column(&mut reader, "Origin");
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[sku].to_string(), r[origin].to_string())
        })
        .collect()
}

fn skus(csv: &str) -> Vec<String> {
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let sku = column(&mut reader, "SKU");
    reader.records().map(|r| r.unwrap()[sku].to_string()).collect()
}

#[tokio::test]
async fn name_search_and_primary_key_items_in_one_job() {
    let red = format!("{BASE}/red-mug");
    let adapter = ScriptedAdapter::new()
        .with_results("Red Mug", vec![("Red Mug", red.as_str())])
        .with_page(page(&red, "Red Mug"))
        .with_product("B2", "Blue Mug", &format!("{BASE}/blue-mug"));
    let f = fixture(InMemoryJobStore::arc(), ScriptedFactory::new(adapter));

    let id = f
        .dispatcher
        .submit(vec![Item::new("A1", "Red Mug"), Item::new("B2", "Blue Mug")])
        .unwrap()
        .job_id;
    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!((done.successful, done.failed, done.total), (2, 0, 2));
    assert_eq!(f.factory.adapter().search_calls("A1"), 3);
    assert_eq!(f.factory.adapter().search_calls("B2"), 1);

    let results = f.writer.contents(done.results_file.as_deref().unwrap()).unwrap();
    assert_eq!(
        skus_and_origins(&results),
        vec![
            ("A1".to_string(), MatchOrigin::NameSearch.as_str().to_string()),
            ("B2".to_string(), MatchOrigin::PrimaryKeySearch.as_str().to_string()),
        ]
    );
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn every_submitted_key_lands_in_exactly_one_file() {
    let f = fixture(InMemoryJobStore::arc(), ScriptedFactory::new(catalog()));

    let mut items = mugs();
    items.push(Item::new("Z9", "Unknown Teapot"));
    items.push(Item::new("Y8", "Unknown Jug"));
    let mut submitted: Vec<String> = items.iter().map(|i| i.sku.clone()).collect();
    let id = f.dispatcher.submit(items).unwrap().job_id;
    let done = f.dispatcher.wait_until_terminal(id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let results = f.writer.contents(done.results_file.as_deref().unwrap()).unwrap();
    let errors = f.writer.contents(done.errors_file.as_deref().unwrap()).unwrap();
    let mut written = skus(&results);
    written.extend(skus(&errors));

    written.sort();
    submitted.sort();
    assert_eq!(written, submitted);
    f.dispatcher.shutdown().await;
}
