use serde::{Deserialize, Serialize};

use crawlnet_core::{DomainError, DomainResult};

/// A product to resolve: the SKU is the primary search key, the name is both the
/// fallback search term and the title a resolved page must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub sku: String,
    #[serde(alias = "partial_name")]
    pub name: String,
    /// Order the item was taken from, when it came from order details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl Item {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            order_id: None,
            order_number: None,
        }
    }

    pub fn with_source(mut self, order_id: Option<String>, order_number: Option<String>) -> Self {
        self.order_id = order_id;
        self.order_number = order_number;
        self
    }

    /// Reject blank keys and trim surrounding whitespace.
    pub fn normalized(self) -> DomainResult<Self> {
        let sku = self.sku.trim().to_string();
        let name = self.name.trim().to_string();

        if sku.is_empty() {
            return Err(DomainError::validation(format!(
                "item '{name}' has an empty sku"
            )));
        }
        if name.is_empty() {
            return Err(DomainError::validation(format!(
                "item with sku '{sku}' has an empty name"
            )));
        }

        Ok(Self { sku, name, ..self })
    }
}

/// Validate a submitted item list (non-empty, every item well formed).
pub fn normalize_items(items: Vec<Item>) -> DomainResult<Vec<Item>> {
    if items.is_empty() {
        return Err(DomainError::validation("item list is empty"));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            item.normalized().map_err(|e| match e {
                DomainError::Validation(msg) => {
                    DomainError::validation(format!("item {}: {msg}", i + 1))
                }
                other => other,
            })
        })
        .collect()
}
