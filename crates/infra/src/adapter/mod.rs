//! Extraction adapter seam.
//!
//! The adapter is the only component that talks to the target site. One adapter
//! instance is one exclusive session: the runner opens it through a
//! [`SessionFactory`] at job start and closes it on every exit path.

pub mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crawlnet_catalog::ProductDetails;

pub use catalog::{CatalogAdapter, CatalogFixture, CatalogSessionFactory, FixtureProduct};

/// Adapter-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// A single call failed; the pipeline may retry it.
    #[error("transient adapter error: {0}")]
    Transient(String),

    /// A call exceeded the adapter's own bounded wait.
    #[error("adapter timed out: {0}")]
    Timeout(String),

    /// The session is gone; nothing else in this job can succeed.
    #[error("session lost: {0}")]
    SessionLost(String),

    /// A session could not be established.
    #[error("session setup failed: {0}")]
    Setup(String),
}

impl AdapterError {
    /// True when the error ends the whole job rather than one attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::SessionLost(_) | AdapterError::Setup(_))
    }
}

/// A search result handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
}

/// Alternate variant (usually a colour) declared by a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantLink {
    pub label: String,
    pub url: String,
}

/// A loaded product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub variants: Vec<VariantLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Page),
    NotFound,
}

/// Capability over one exclusive extraction session.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Run a site search and return candidate handles in result order.
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, AdapterError>;

    /// Load a locator directly.
    async fn resolve(&self, url: &str) -> Result<Resolution, AdapterError>;

    /// Pull structured detail out of a loaded page.
    async fn extract(&self, page: &Page) -> Result<ProductDetails, AdapterError>;

    /// Release the session.
    async fn close(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[async_trait]
impl<T: ExtractionAdapter + ?Sized> ExtractionAdapter for std::sync::Arc<T> {
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, AdapterError> {
        (**self).search(query).await
    }

    async fn resolve(&self, url: &str) -> Result<Resolution, AdapterError> {
        (**self).resolve(url).await
    }

    async fn extract(&self, page: &Page) -> Result<ProductDetails, AdapterError> {
        (**self).extract(page).await
    }

    async fn close(&self) -> Result<(), AdapterError> {
        (**self).close().await
    }
}

/// Opens extraction sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ExtractionAdapter>, AdapterError>;
}
