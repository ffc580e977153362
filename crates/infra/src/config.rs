//! Environment-driven configuration for the crawler.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::jobs::RunnerSettings;
use crate::pipeline::{DEFAULT_FALLBACK_BASE_URL, SearchPlan, StrategyKind, StrategyStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerConfig {
    /// Where result CSVs are written and served from.
    pub results_dir: PathBuf,
    /// Root for durable state (job documents live under `jobs/`).
    pub data_dir: PathBuf,
    /// Keep job records on disk instead of in memory.
    pub persist_jobs: bool,
    pub sku_search_attempts: u32,
    pub name_search_attempts: u32,
    pub search_backoff: Duration,
    pub item_delay: Duration,
    pub session_attempts: u32,
    pub session_backoff: Duration,
    pub fallback_base_url: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("scraping_results"),
            data_dir: PathBuf::from("data"),
            persist_jobs: true,
            sku_search_attempts: 3,
            name_search_attempts: 3,
            search_backoff: Duration::from_millis(2000),
            item_delay: Duration::from_millis(2000),
            session_attempts: 3,
            session_backoff: Duration::from_millis(5000),
            fallback_base_url: DEFAULT_FALLBACK_BASE_URL.to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Load `.env` (if present), then read `CRAWLNET_*` variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("CRAWLNET_RESULTS_DIR") {
            cfg.results_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CRAWLNET_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed::<bool, _>(&lookup, "CRAWLNET_PERSIST_JOBS")? {
            cfg.persist_jobs = v;
        }
        if let Some(v) = parsed(&lookup, "CRAWLNET_SKU_SEARCH_RETRIES")? {
            cfg.sku_search_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "CRAWLNET_NAME_SEARCH_RETRIES")? {
            cfg.name_search_attempts = v;
        }
        if let Some(ms) = parsed(&lookup, "CRAWLNET_SEARCH_BACKOFF_MS")? {
            cfg.search_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(&lookup, "CRAWLNET_ITEM_DELAY_MS")? {
            cfg.item_delay = Duration::from_millis(ms);
        }
        if let Some(v) = parsed(&lookup, "CRAWLNET_SESSION_ATTEMPTS")? {
            cfg.session_attempts = v;
        }
        if let Some(ms) = parsed(&lookup, "CRAWLNET_SESSION_BACKOFF_MS")? {
            cfg.session_backoff = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("CRAWLNET_FALLBACK_BASE_URL") {
            cfg.fallback_base_url = v.trim_end_matches('/').to_string();
        }

        if cfg.session_attempts == 0 {
            anyhow::bail!("CRAWLNET_SESSION_ATTEMPTS must be at least 1");
        }
        Ok(cfg)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn search_plan(&self) -> SearchPlan {
        SearchPlan::new(
            vec![
                StrategyStep::new(
                    StrategyKind::PrimaryKeySearch,
                    self.sku_search_attempts,
                    self.search_backoff,
                ),
                StrategyStep::new(
                    StrategyKind::NameSearch,
                    self.name_search_attempts,
                    self.search_backoff,
                ),
                StrategyStep::new(StrategyKind::DerivedUrl, 1, Duration::ZERO),
            ],
            self.fallback_base_url.clone(),
        )
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            session_attempts: self.session_attempts,
            session_backoff: self.session_backoff,
            item_delay: self.item_delay,
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_default_plan() {
        let cfg = CrawlerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, CrawlerConfig::default());
        assert_eq!(cfg.search_plan(), SearchPlan::default());
        assert_eq!(cfg.runner_settings(), RunnerSettings::default());
        assert_eq!(cfg.jobs_dir(), PathBuf::from("data/jobs"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = CrawlerConfig::from_lookup(lookup(&[
            ("CRAWLNET_RESULTS_DIR", "/tmp/out"),
            ("CRAWLNET_SKU_SEARCH_RETRIES", "5"),
            ("CRAWLNET_NAME_SEARCH_RETRIES", "0"),
            ("CRAWLNET_SEARCH_BACKOFF_MS", "10"),
            ("CRAWLNET_ITEM_DELAY_MS", " 0 "),
            ("CRAWLNET_PERSIST_JOBS", "false"),
            ("CRAWLNET_FALLBACK_BASE_URL", "https://shop.example/"),
        ]))
        .unwrap();

        assert_eq!(cfg.results_dir, PathBuf::from("/tmp/out"));
        assert!(!cfg.persist_jobs);
        assert_eq!(cfg.item_delay, Duration::ZERO);

        let plan = cfg.search_plan();
        assert_eq!(plan.steps[0].attempts, 5);
        assert_eq!(plan.steps[1].attempts, 0);
        assert_eq!(plan.steps[0].backoff, Duration::from_millis(10));
        assert_eq!(plan.derived_url("blue-mug"), "https://shop.example/blue-mug");
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = CrawlerConfig::from_lookup(lookup(&[("CRAWLNET_ITEM_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CRAWLNET_ITEM_DELAY_MS"));
    }

    #[test]
    fn zero_session_attempts_is_rejected() {
        assert!(CrawlerConfig::from_lookup(lookup(&[("CRAWLNET_SESSION_ATTEMPTS", "0")])).is_err());
    }
}
