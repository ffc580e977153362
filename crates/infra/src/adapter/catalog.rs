//! Fixture-backed adapter over a JSON product catalog.
//!
//! Used for dry runs of the whole job pipeline without a live site, and by
//! tests that want realistic search behaviour.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crawlnet_catalog::{ProductDetails, is_catalog_image, title_contains_all_tokens};

use super::{
    AdapterError, Candidate, ExtractionAdapter, Page, Resolution, SessionFactory, VariantLink,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureProduct {
    pub sku: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFixture {
    pub products: Vec<FixtureProduct>,
}

impl CatalogFixture {
    pub fn new(products: Vec<FixtureProduct>) -> Self {
        Self { products }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::Setup(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| AdapterError::Setup(format!("parse {}: {e}", path.display())))
    }

    fn by_url(&self, url: &str) -> Option<&FixtureProduct> {
        let wanted = url.trim_end_matches('/');
        self.products
            .iter()
            .find(|p| p.url.trim_end_matches('/').eq_ignore_ascii_case(wanted))
    }
}

/// One session over a shared fixture.
#[derive(Debug)]
pub struct CatalogAdapter {
    fixture: Arc<CatalogFixture>,
    closed: AtomicBool,
}

impl CatalogAdapter {
    pub fn new(fixture: Arc<CatalogFixture>) -> Self {
        Self {
            fixture,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), AdapterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::SessionLost("catalog session closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExtractionAdapter for CatalogAdapter {
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, AdapterError> {
        self.ensure_open()?;
        let query = query.trim();

        Ok(self
            .fixture
            .products
            .iter()
            .filter(|p| {
                p.sku.eq_ignore_ascii_case(query) || title_contains_all_tokens(&p.title, query)
            })
            .map(|p| Candidate {
                title: p.title.clone(),
                url: p.url.clone(),
            })
            .collect())
    }

    async fn resolve(&self, url: &str) -> Result<Resolution, AdapterError> {
        self.ensure_open()?;

        Ok(match self.fixture.by_url(url) {
            Some(p) => Resolution::Found(Page {
                url: p.url.clone(),
                title: p.title.clone(),
                variants: p.variants.clone(),
            }),
            None => Resolution::NotFound,
        })
    }

    async fn extract(&self, page: &Page) -> Result<ProductDetails, AdapterError> {
        self.ensure_open()?;

        let product = self
            .fixture
            .by_url(&page.url)
            .ok_or_else(|| AdapterError::Transient(format!("page {} went away", page.url)))?;

        let images = product
            .images
            .iter()
            .filter(|src| is_catalog_image(src))
            .cloned()
            .collect();

        Ok(ProductDetails::from_description(&product.description, images))
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fresh [`CatalogAdapter`] per job.
#[derive(Debug, Clone)]
pub struct CatalogSessionFactory {
    fixture: Arc<CatalogFixture>,
}

impl CatalogSessionFactory {
    pub fn new(fixture: CatalogFixture) -> Self {
        Self {
            fixture: Arc::new(fixture),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        Ok(Self::new(CatalogFixture::from_json_file(path)?))
    }

    pub fn fixture(&self) -> &CatalogFixture {
        &self.fixture
    }
}

#[async_trait]
impl SessionFactory for CatalogSessionFactory {
    async fn open(&self) -> Result<Box<dyn ExtractionAdapter>, AdapterError> {
        Ok(Box::new(CatalogAdapter::new(self.fixture.clone())))
    }
}
