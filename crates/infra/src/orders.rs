//! In-memory book of order summaries and scraped order details.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::info;

use crawlnet_catalog::Item;
use crawlnet_core::{DomainError, DomainResult};
use crawlnet_orders::{Order, OrderDetails, OrderStats, items_from_order_details};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderListing {
    pub orders: Vec<Order>,
    pub stats: OrderStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteSummary {
    pub deleted: usize,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub orders: usize,
    pub details: usize,
}

#[derive(Debug, Default)]
struct Book {
    orders: Vec<Order>,
    details: Vec<OrderDetails>,
}

impl Book {
    fn remove_order(&mut self, key: &str) -> bool {
        let before = (self.orders.len(), self.details.len());
        let ids: Vec<String> = self
            .orders
            .iter()
            .filter(|o| o.matches_key(key))
            .filter_map(|o| o.order_id.clone())
            .collect();
        self.orders.retain(|o| !o.matches_key(key));
        self.details
            .retain(|d| d.order_id != key && !ids.contains(&d.order_id));
        before != (self.orders.len(), self.details.len())
    }
}

/// Orders keep the order they were first seen in; details are keyed by
/// order id and replaced wholesale on upsert.
#[derive(Debug, Default)]
pub struct InMemoryOrderBook {
    book: RwLock<Book>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Book> {
        self.book.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Book> {
        self.book.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert or replace order summaries. The batch is rejected whole if any
    /// row lacks a key.
    pub fn upsert_orders(&self, orders: Vec<Order>) -> DomainResult<UpsertSummary> {
        let orders = orders
            .into_iter()
            .enumerate()
            .map(|(i, o)| {
                o.normalized()
                    .map_err(|e| DomainError::validation(format!("order {}: {e}", i + 1)))
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let mut book = self.write();
        let mut summary = UpsertSummary::default();
        for order in orders {
            let key = order.key().to_string();
            match book.orders.iter_mut().find(|o| o.matches_key(&key)) {
                Some(existing) => {
                    *existing = order;
                    summary.updated += 1;
                }
                None => {
                    book.orders.push(order);
                    summary.inserted += 1;
                }
            }
        }
        info!(inserted = summary.inserted, updated = summary.updated, "orders upserted");
        Ok(summary)
    }

    pub fn list(&self) -> OrderListing {
        let book = self.read();
        OrderListing {
            stats: OrderStats::from_orders(&book.orders),
            orders: book.orders.clone(),
        }
    }

    /// Store details for an order, replacing earlier details for the same id.
    /// Returns `true` when details already existed.
    pub fn upsert_details(&self, details: OrderDetails) -> DomainResult<bool> {
        details.validate()?;
        let mut book = self.write();
        let replaced = match book.details.iter_mut().find(|d| d.order_id == details.order_id) {
            Some(existing) => {
                *existing = details;
                true
            }
            None => {
                book.details.push(details);
                false
            }
        };
        Ok(replaced)
    }

    pub fn get_details(&self, order_id: &str) -> DomainResult<OrderDetails> {
        self.read()
            .details
            .iter()
            .find(|d| d.order_id == order_id)
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    pub fn delete_details(&self, order_id: &str) -> DomainResult<()> {
        let mut book = self.write();
        let before = book.details.len();
        book.details.retain(|d| d.order_id != order_id);
        if book.details.len() == before {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    /// Delete an order (by id or number) together with its details.
    pub fn delete_order(&self, key: &str) -> DomainResult<()> {
        if self.write().remove_order(key) {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    pub fn delete_many(&self, keys: &[String]) -> BulkDeleteSummary {
        let mut book = self.write();
        let mut summary = BulkDeleteSummary::default();
        for key in keys {
            if book.remove_order(key) {
                summary.deleted += 1;
            } else {
                summary.missing.push(key.clone());
            }
        }
        summary
    }

    pub fn clear(&self) -> ClearSummary {
        let mut book = self.write();
        let summary = ClearSummary {
            orders: book.orders.len(),
            details: book.details.len(),
        };
        book.orders.clear();
        book.details.clear();
        info!(orders = summary.orders, details = summary.details, "order book cleared");
        summary
    }

    /// Distinct items across all stored details, ready for job submission.
    pub fn items(&self) -> Vec<Item> {
        items_from_order_details(&self.read().details)
    }
}
