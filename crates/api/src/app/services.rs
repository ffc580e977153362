//! Service wiring shared by all handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crawlnet_infra::adapter::{CatalogFixture, CatalogSessionFactory};
use crawlnet_infra::jobs::{
    InMemoryJobStore, JobDispatcher, JobRunner, JobStore, JsonFileJobStore,
};
use crawlnet_infra::orders::InMemoryOrderBook;
use crawlnet_infra::pipeline::ProductSearchPipeline;
use crawlnet_infra::sink::CsvResultWriter;

use crate::config::ApiConfig;

pub type SharedJobStore = Arc<dyn JobStore>;

/// Non-secret settings reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub results_dir: PathBuf,
    pub persist_jobs: bool,
    pub catalog_products: usize,
    pub item_delay_ms: u128,
    pub fallback_base_url: String,
}

pub struct AppServices {
    pub jobs: JobDispatcher<SharedJobStore>,
    pub orders: InMemoryOrderBook,
    pub results: Arc<CsvResultWriter>,
    pub info: ServiceInfo,
}

impl AppServices {
    /// Stop the job worker; queued jobs stay pending for the next start.
    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
    }
}

/// Build all services from configuration. Must run inside a Tokio runtime.
pub fn build_services(config: &ApiConfig) -> Result<AppServices> {
    let crawler = &config.crawler;

    let store: SharedJobStore = if crawler.persist_jobs {
        let dir = crawler.jobs_dir();
        Arc::new(
            JsonFileJobStore::open(&dir)
                .with_context(|| format!("opening job store in {}", dir.display()))?,
        )
    } else {
        Arc::new(InMemoryJobStore::new())
    };

    let results = Arc::new(
        CsvResultWriter::new(&crawler.results_dir)
            .with_context(|| format!("creating results dir {}", crawler.results_dir.display()))?,
    );

    let fixture = match &config.catalog_fixture {
        Some(path) => CatalogFixture::from_json_file(path)
            .with_context(|| format!("loading catalog fixture {}", path.display()))?,
        None => {
            tracing::warn!("CRAWLNET_CATALOG_FIXTURE not set; every item will end as not found");
            CatalogFixture::default()
        }
    };
    let catalog_products = fixture.products.len();
    let sessions = Arc::new(CatalogSessionFactory::new(fixture));

    let runner = JobRunner::new(
        store,
        sessions,
        ProductSearchPipeline::new(crawler.search_plan()),
        results.clone(),
        crawler.runner_settings(),
    );
    let jobs = JobDispatcher::start(runner).context("starting job dispatcher")?;

    Ok(AppServices {
        jobs,
        orders: InMemoryOrderBook::new(),
        results,
        info: ServiceInfo {
            results_dir: crawler.results_dir.clone(),
            persist_jobs: crawler.persist_jobs,
            catalog_products,
            item_delay_ms: crawler.item_delay.as_millis(),
            fallback_base_url: crawler.fallback_base_url.clone(),
        },
    })
}
