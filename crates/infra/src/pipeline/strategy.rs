//! Search strategies and the ordered plan that drives them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crawlnet_catalog::MatchOrigin;

/// Default base for derived product URLs.
pub const DEFAULT_FALLBACK_BASE_URL: &str = "https://www.onlinehomeshop.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Site search by SKU.
    PrimaryKeySearch,
    /// Site search by descriptive name.
    NameSearch,
    /// Direct load of `{base}/{slugify(name)}`.
    DerivedUrl,
}

impl StrategyKind {
    pub fn origin(&self) -> MatchOrigin {
        match self {
            StrategyKind::PrimaryKeySearch => MatchOrigin::PrimaryKeySearch,
            StrategyKind::NameSearch => MatchOrigin::NameSearch,
            StrategyKind::DerivedUrl => MatchOrigin::DerivedUrl,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PrimaryKeySearch => "primary_key_search",
            StrategyKind::NameSearch => "name_search",
            StrategyKind::DerivedUrl => "derived_url",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a plan: a strategy with its own retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyStep {
    pub strategy: StrategyKind,
    /// Attempts before falling through to the next step (0 skips the step).
    pub attempts: u32,
    /// Pause between attempts of this step.
    pub backoff: Duration,
}

impl StrategyStep {
    pub fn new(strategy: StrategyKind, attempts: u32, backoff: Duration) -> Self {
        Self {
            strategy,
            attempts,
            backoff,
        }
    }
}

/// Ordered fallback policy evaluated for every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub steps: Vec<StrategyStep>,
    pub fallback_base_url: String,
}

impl Default for SearchPlan {
    fn default() -> Self {
        let backoff = Duration::from_secs(2);
        Self {
            steps: vec![
                StrategyStep::new(StrategyKind::PrimaryKeySearch, 3, backoff),
                StrategyStep::new(StrategyKind::NameSearch, 3, backoff),
                StrategyStep::new(StrategyKind::DerivedUrl, 1, Duration::ZERO),
            ],
            fallback_base_url: DEFAULT_FALLBACK_BASE_URL.to_string(),
        }
    }
}

impl SearchPlan {
    pub fn new(steps: Vec<StrategyStep>, fallback_base_url: impl Into<String>) -> Self {
        Self {
            steps,
            fallback_base_url: fallback_base_url.into(),
        }
    }

    /// Override every step's backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        for step in &mut self.steps {
            step.backoff = backoff;
        }
        self
    }

    pub fn with_fallback_base_url(mut self, base: impl Into<String>) -> Self {
        self.fallback_base_url = base.into();
        self
    }

    pub fn derived_url(&self, slug: &str) -> String {
        format!("{}/{}", self.fallback_base_url.trim_end_matches('/'), slug)
    }
}

/// Where the pipeline currently is for the item being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SearchPhase {
    Starting,
    Searching { strategy: StrategyKind, attempt: u32 },
    LoadingPage,
    CheckingVariants,
    TryingFallback,
    Extracting,
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchPhase::Starting => f.write_str("starting"),
            SearchPhase::Searching { strategy, attempt } => {
                write!(f, "searching ({strategy}, attempt {attempt})")
            }
            SearchPhase::LoadingPage => f.write_str("loading product page"),
            SearchPhase::CheckingVariants => f.write_str("checking colour variants"),
            SearchPhase::TryingFallback => f.write_str("trying derived url"),
            SearchPhase::Extracting => f.write_str("extracting details"),
        }
    }
}
