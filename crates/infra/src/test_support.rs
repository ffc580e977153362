//! Scripted adapter and session factory for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crawlnet_catalog::ProductDetails;

use crate::adapter::{
    AdapterError, Candidate, ExtractionAdapter, Page, Resolution, SessionFactory,
};

pub fn page(url: &str, title: &str) -> Page {
    Page {
        url: url.to_string(),
        title: title.to_string(),
        variants: Vec::new(),
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Adapter whose search results and pages are fixed up front.
///
/// Unknown queries return no candidates and unknown URLs resolve to
/// `NotFound`.
#[derive(Default)]
pub struct ScriptedAdapter {
    results: HashMap<String, Vec<Candidate>>,
    pages: HashMap<String, Page>,
    gates: HashMap<String, Arc<Notify>>,
    hooks: HashMap<String, Hook>,
    failing_extracts: AtomicU32,
    lose_session: bool,
    calls: Mutex<HashMap<String, u32>>,
    closes: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, hits: Vec<(&str, &str)>) -> Self {
        let hits = hits
            .into_iter()
            .map(|(title, url)| Candidate {
                title: title.to_string(),
                url: url.to_string(),
            })
            .collect();
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    /// A product reachable by searching its SKU.
    pub fn with_product(self, sku: &str, title: &str, url: &str) -> Self {
        self.with_page(page(url, title))
            .with_results(sku, vec![(title, url)])
    }

    /// Make the first `n` extract calls fail transiently.
    pub fn failing_extracts(self, n: u32) -> Self {
        self.failing_extracts.store(n, Ordering::SeqCst);
        self
    }

    /// Every call reports the session as lost.
    pub fn losing_session(mut self) -> Self {
        self.lose_session = true;
        self
    }

    /// Searching `query` waits until `gate` is notified.
    pub fn with_gate(mut self, query: &str, gate: Arc<Notify>) -> Self {
        self.gates.insert(query.to_string(), gate);
        self
    }

    /// Run `hook` whenever `query` is searched.
    pub fn with_hook(mut self, query: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.insert(query.to_string(), Arc::new(hook));
        self
    }

    pub fn search_calls(&self, query: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or(0)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_session(&self) -> Result<(), AdapterError> {
        if self.lose_session {
            return Err(AdapterError::SessionLost("browser went away".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExtractionAdapter for ScriptedAdapter {
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, AdapterError> {
        self.check_session()?;
        *self
            .calls
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default() += 1;

        if let Some(hook) = self.hooks.get(query) {
            hook();
        }
        if let Some(gate) = self.gates.get(query) {
            gate.notified().await;
        }

        Ok(self.results.get(query).cloned().unwrap_or_default())
    }

    async fn resolve(&self, url: &str) -> Result<Resolution, AdapterError> {
        self.check_session()?;
        Ok(match self.pages.get(url) {
            Some(p) => Resolution::Found(p.clone()),
            None => Resolution::NotFound,
        })
    }

    async fn extract(&self, page: &Page) -> Result<ProductDetails, AdapterError> {
        self.check_session()?;
        let remaining = self.failing_extracts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_extracts.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::Transient("element not ready".into()));
        }
        Ok(ProductDetails::from_description(
            &format!("{}\nBrand: Scripted", page.title),
            Vec::new(),
        ))
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out one shared [`ScriptedAdapter`].
pub struct ScriptedFactory {
    adapter: Arc<ScriptedAdapter>,
    failing_opens: AtomicU32,
    opens: AtomicU32,
}

impl ScriptedFactory {
    pub fn new(adapter: ScriptedAdapter) -> Self {
        Self {
            adapter: Arc::new(adapter),
            failing_opens: AtomicU32::new(0),
            opens: AtomicU32::new(0),
        }
    }

    /// Make the first `n` open calls fail.
    pub fn failing_opens(self, n: u32) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    pub fn adapter(&self) -> &ScriptedAdapter {
        &self.adapter
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> Result<Box<dyn ExtractionAdapter>, AdapterError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::Setup("browser failed to start".into()));
        }
        Ok(Box::new(self.adapter.clone()))
    }
}
