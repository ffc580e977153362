use serde::{Deserialize, Serialize};

use crawlnet_core::{DomainError, DomainResult};

/// One row of the account's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Site-internal id, taken from the view link when not supplied.
    #[serde(default)]
    pub order_id: Option<String>,
    pub order_number: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub view_link: Option<String>,
}

impl Order {
    /// Fill `order_id` from the view link and reject rows without any key.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.order_number = self.order_number.trim().to_string();

        let id = self
            .order_id
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| self.view_link.as_deref().and_then(order_id_from_view_link));
        self.order_id = id;

        if self.order_id.is_none() && self.order_number.is_empty() {
            return Err(DomainError::validation(
                "order needs an order_id, an order_number or a view link",
            ));
        }
        Ok(self)
    }

    /// Key used to address the order: the id when known, else the number.
    pub fn key(&self) -> &str {
        self.order_id.as_deref().unwrap_or(&self.order_number)
    }

    /// True when `key` names this order by id or by number.
    pub fn matches_key(&self, key: &str) -> bool {
        self.order_id.as_deref() == Some(key) || self.order_number == key
    }

    pub fn is_complete(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("complete")
    }

    pub fn is_canceled(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("canceled")
    }
}

/// Extract the id segment from `.../order_id/{id}/`.
pub fn order_id_from_view_link(link: &str) -> Option<String> {
    let (_, rest) = link.split_once("/order_id/")?;
    let id = rest.split('/').next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Counts shown next to the order list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total: usize,
    pub completed: usize,
    pub canceled: usize,
}

impl OrderStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders.into_iter().fold(Self::default(), |mut stats, o| {
            stats.total += 1;
            if o.is_complete() {
                stats.completed += 1;
            } else if o.is_canceled() {
                stats.canceled += 1;
            }
            stats
        })
    }
}
