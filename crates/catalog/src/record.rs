//! Per-item outcome records.

use serde::{Deserialize, Serialize};

use crate::description::ProductDetails;

/// Strategy that produced a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    PrimaryKeySearch,
    NameSearch,
    DerivedUrl,
    Variant,
}

impl MatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOrigin::PrimaryKeySearch => "primary_key_search",
            MatchOrigin::NameSearch => "name_search",
            MatchOrigin::DerivedUrl => "derived_url",
            MatchOrigin::Variant => "variant",
        }
    }
}

impl std::fmt::Display for MatchOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success outcome for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// 1-based position of the item in its job.
    pub index: usize,
    /// Title of the resolved page.
    pub product_name: String,
    pub sku: String,
    pub details: ProductDetails,
    pub product_url: String,
    pub origin: MatchOrigin,
}

/// Failure outcome for one item: identity plus the last error seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub index: usize,
    pub product_name: String,
    pub sku: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_serializes_snake_case() {
        let json = serde_json::to_string(&MatchOrigin::PrimaryKeySearch).unwrap();
        assert_eq!(json, "\"primary_key_search\"");
        assert_eq!(MatchOrigin::DerivedUrl.to_string(), "derived_url");
    }
}
