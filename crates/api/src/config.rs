//! API process configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crawlnet_infra::CrawlerConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// JSON catalog served by the built-in extraction adapter.
    pub catalog_fixture: Option<PathBuf>,
    pub crawler: CrawlerConfig,
}

impl ApiConfig {
    /// Load `.env` (via the crawler config), then read the process environment.
    pub fn from_env() -> Result<Self> {
        CrawlerConfig::from_env()?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("CRAWLNET_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("invalid value for CRAWLNET_BIND_ADDR: {bind_addr:?}"))?;

        Ok(Self {
            bind_addr,
            catalog_fixture: lookup("CRAWLNET_CATALOG_FIXTURE").map(PathBuf::from),
            crawler: CrawlerConfig::from_lookup(&lookup)?,
        })
    }
}
