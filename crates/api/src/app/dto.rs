use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Deserialize;

use crawlnet_catalog::Item;
use crawlnet_orders::Order;

use crate::app::errors::{self, Response};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(alias = "products")]
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertOrdersRequest {
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub order_ids: Vec<String>,
}

/// Unwrap a JSON body, answering malformed input with the standard error body.
pub fn body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|axum::Json(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}
