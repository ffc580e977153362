//! Per-item search pipeline.
//!
//! Resolves one [`Item`] to a success or failure record by walking a
//! [`SearchPlan`] step by step. Every step runs the same loop: try, back off,
//! try again until the step's budget is spent, then fall through to the next.

pub mod strategy;

use thiserror::Error;
use tracing::{debug, info};

use crawlnet_catalog::{
    FailureRecord, Item, MatchOrigin, ProductRecord, is_product_title, slugify,
    title_contains_all_tokens, titles_equal,
};

use crate::adapter::{AdapterError, ExtractionAdapter, Page, Resolution};

pub use strategy::{
    DEFAULT_FALLBACK_BASE_URL, SearchPhase, SearchPlan, StrategyKind, StrategyStep,
};

/// Failure message used when no step left a more specific one.
pub const NOT_FOUND_AFTER_ALL_ATTEMPTS: &str = "Product not found after all attempts";

/// Outcome of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success(ProductRecord),
    Failure(FailureRecord),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }
}

/// Errors that end the whole job, not just one item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("extraction session failed: {0}")]
    Session(String),
}

/// Receives phase changes while an item is processed.
pub trait ProgressObserver: Send {
    fn on_phase(&mut self, phase: &SearchPhase);
}

/// Observer that ignores every phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_phase(&mut self, _phase: &SearchPhase) {}
}

enum Attempt {
    Matched(Box<ProductRecord>),
    Miss(String),
}

/// Applies a [`SearchPlan`] through an [`ExtractionAdapter`].
#[derive(Debug, Clone, Default)]
pub struct ProductSearchPipeline {
    plan: SearchPlan,
}

impl ProductSearchPipeline {
    pub fn new(plan: SearchPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Resolve `item` (at 1-based `index` in its job).
    ///
    /// Only a lost session is an error; everything else ends as an outcome.
    pub async fn run(
        &self,
        adapter: &dyn ExtractionAdapter,
        index: usize,
        item: &Item,
        observer: &mut dyn ProgressObserver,
    ) -> Result<ItemOutcome, PipelineError> {
        observer.on_phase(&SearchPhase::Starting);
        let mut last_error: Option<String> = None;

        for step in &self.plan.steps {
            for attempt in 1..=step.attempts {
                let phase = match step.strategy {
                    StrategyKind::DerivedUrl => SearchPhase::TryingFallback,
                    strategy => SearchPhase::Searching { strategy, attempt },
                };
                observer.on_phase(&phase);

                let result = match step.strategy {
                    StrategyKind::PrimaryKeySearch => {
                        self.search_attempt(adapter, &item.sku, index, item, step.strategy, observer)
                            .await
                    }
                    StrategyKind::NameSearch => {
                        self.search_attempt(adapter, &item.name, index, item, step.strategy, observer)
                            .await
                    }
                    StrategyKind::DerivedUrl => {
                        self.fallback_attempt(adapter, index, item, observer).await
                    }
                };

                match result? {
                    Attempt::Matched(record) => {
                        info!(
                            sku = %item.sku,
                            strategy = %step.strategy,
                            origin = %record.origin,
                            attempt,
                            "item matched"
                        );
                        return Ok(ItemOutcome::Success(*record));
                    }
                    Attempt::Miss(reason) => {
                        debug!(
                            sku = %item.sku,
                            strategy = %step.strategy,
                            attempt,
                            reason = %reason,
                            "attempt missed"
                        );
                        last_error = Some(reason);
                        if attempt < step.attempts && !step.backoff.is_zero() {
                            tokio::time::sleep(step.backoff).await;
                        }
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| NOT_FOUND_AFTER_ALL_ATTEMPTS.to_string());
        info!(sku = %item.sku, error = %error, "item exhausted all strategies");
        Ok(ItemOutcome::Failure(FailureRecord {
            index,
            product_name: item.name.clone(),
            sku: item.sku.clone(),
            error,
        }))
    }

    async fn search_attempt(
        &self,
        adapter: &dyn ExtractionAdapter,
        query: &str,
        index: usize,
        item: &Item,
        strategy: StrategyKind,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Attempt, PipelineError> {
        let candidates = match adapter.search(query).await {
            Ok(c) => c,
            Err(e) => return miss_or_fatal(e),
        };
        if candidates.is_empty() {
            return Ok(Attempt::Miss(format!("No search results for '{query}'")));
        }

        let Some(candidate) = candidates
            .iter()
            .find(|c| title_contains_all_tokens(&c.title, &item.name))
        else {
            return Ok(Attempt::Miss(format!(
                "No search result for '{query}' matched '{}'",
                item.name
            )));
        };

        observer.on_phase(&SearchPhase::LoadingPage);
        let page = match adapter.resolve(&candidate.url).await {
            Ok(Resolution::Found(page)) => page,
            Ok(Resolution::NotFound) => {
                return Ok(Attempt::Miss(format!(
                    "Product page {} not found",
                    candidate.url
                )));
            }
            Err(e) => return miss_or_fatal(e),
        };

        if titles_equal(&page.title, &item.name) {
            return self
                .extract(adapter, page, index, item, strategy.origin(), observer)
                .await;
        }

        observer.on_phase(&SearchPhase::CheckingVariants);
        let Some(variant) = page
            .variants
            .iter()
            .find(|v| titles_equal(&v.label, &item.name))
        else {
            return Ok(Attempt::Miss(format!(
                "Found '{}' but no variant matched '{}'",
                page.title, item.name
            )));
        };

        let variant_page = match adapter.resolve(&variant.url).await {
            Ok(Resolution::Found(p)) => p,
            Ok(Resolution::NotFound) => {
                return Ok(Attempt::Miss(format!("Variant page {} not found", variant.url)));
            }
            Err(e) => return miss_or_fatal(e),
        };
        if !titles_equal(&variant_page.title, &item.name) {
            return Ok(Attempt::Miss(format!(
                "Variant page '{}' does not match '{}'",
                variant_page.title, item.name
            )));
        }

        self.extract(adapter, variant_page, index, item, MatchOrigin::Variant, observer)
            .await
    }

    async fn fallback_attempt(
        &self,
        adapter: &dyn ExtractionAdapter,
        index: usize,
        item: &Item,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Attempt, PipelineError> {
        let slug = slugify(&item.name);
        if slug.is_empty() {
            return Ok(Attempt::Miss(format!(
                "Cannot derive a product URL from '{}'",
                item.name
            )));
        }
        let url = self.plan.derived_url(&slug);

        let page = match adapter.resolve(&url).await {
            Ok(Resolution::Found(page)) => page,
            Ok(Resolution::NotFound) => {
                return Ok(Attempt::Miss(format!("Fallback URL {url} not found")));
            }
            Err(e) => return miss_or_fatal(e),
        };
        if !is_product_title(&page.title) {
            return Ok(Attempt::Miss(format!(
                "Fallback URL {url} is not a product page"
            )));
        }

        self.extract(adapter, page, index, item, MatchOrigin::DerivedUrl, observer)
            .await
    }

    async fn extract(
        &self,
        adapter: &dyn ExtractionAdapter,
        page: Page,
        index: usize,
        item: &Item,
        origin: MatchOrigin,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Attempt, PipelineError> {
        observer.on_phase(&SearchPhase::Extracting);
        match adapter.extract(&page).await {
            Ok(details) => Ok(Attempt::Matched(Box::new(ProductRecord {
                index,
                product_name: page.title,
                sku: item.sku.clone(),
                details,
                product_url: page.url,
                origin,
            }))),
            Err(e) if e.is_fatal() => Err(PipelineError::Session(e.to_string())),
            Err(e) => Ok(Attempt::Miss(format!("Extraction failed: {e}"))),
        }
    }
}

fn miss_or_fatal(e: AdapterError) -> Result<Attempt, PipelineError> {
    if e.is_fatal() {
        Err(PipelineError::Session(e.to_string()))
    } else {
        Ok(Attempt::Miss(e.to_string()))
    }
}
