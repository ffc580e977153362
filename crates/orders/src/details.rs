use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crawlnet_catalog::Item;
use crawlnet_core::{DomainError, DomainResult};

/// Placeholder stored for fields the order page did not show.
pub const MISSING: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
}

/// A purchased product on an order page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub product_name: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub subtotal: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl OrderLine {
    fn sku_key(&self) -> Option<&str> {
        present(&self.sku)
    }

    fn name(&self) -> Option<&str> {
        present(&self.product_name)
    }
}

fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != MISSING).then_some(value)
}

/// Everything captured from one order's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub order_info: OrderInfo,
    #[serde(default, alias = "products")]
    pub lines: Vec<OrderLine>,
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
}

impl OrderDetails {
    pub fn new(order_id: impl Into<String>, order_info: OrderInfo, lines: Vec<OrderLine>) -> Self {
        Self {
            order_id: order_id.into(),
            order_info,
            lines,
            scraped_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.order_id.trim().is_empty() {
            return Err(DomainError::validation("order details need an order_id"));
        }
        Ok(())
    }

    pub fn total_products(&self) -> usize {
        self.lines.len()
    }
}

/// Build a submission list from stored order details.
///
/// One item per distinct SKU, first occurrence wins; lines with a blank or
/// placeholder SKU or name are skipped. Each item keeps the order it came from.
pub fn items_from_order_details<'a>(
    details: impl IntoIterator<Item = &'a OrderDetails>,
) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for doc in details {
        for line in &doc.lines {
            let (Some(sku), Some(name)) = (line.sku_key(), line.name()) else {
                continue;
            };
            if !seen.insert(sku.to_string()) {
                continue;
            }
            items.push(
                Item::new(sku, name)
                    .with_source(Some(doc.order_id.clone()), doc.order_info.order_number.clone()),
            );
        }
    }

    items
}
