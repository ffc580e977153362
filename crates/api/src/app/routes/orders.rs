use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

use crawlnet_orders::OrderDetails;

use crate::app::errors::{self, Response};
use crate::app::services::AppServices;
use crate::app::dto;

pub fn router() -> Router {
    Router::new()
        .route("/", post(upsert_orders).get(list_orders).delete(clear_orders))
        .route("/items", get(order_items))
        .route("/bulk-delete", post(bulk_delete))
        .route("/:order_id", axum::routing::delete(delete_order))
        .route(
            "/:order_id/details",
            put(upsert_details).get(get_details).delete(delete_details),
        )
}

/// POST /orders
pub async fn upsert_orders(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::UpsertOrdersRequest>, JsonRejection>,
) -> Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match services.orders.upsert_orders(body.orders) {
        Ok(summary) => Json(json!({
            "success": true,
            "inserted": summary.inserted,
            "updated": summary.updated,
        }))
        .into_response(),
        Err(e) => errors::order_error_to_response(e, None),
    }
}

/// GET /orders
pub async fn list_orders(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let listing = services.orders.list();
    Json(json!({
        "success": true,
        "orders": listing.orders,
        "stats": listing.stats,
    }))
    .into_response()
}

/// DELETE /orders
pub async fn clear_orders(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let cleared = services.orders.clear();
    Json(json!({
        "success": true,
        "message": format!(
            "Deleted {} orders and {} order details",
            cleared.orders, cleared.details
        ),
        "deleted_orders": cleared.orders,
        "deleted_details": cleared.details,
    }))
    .into_response()
}

/// POST /orders/bulk-delete
pub async fn bulk_delete(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::BulkDeleteRequest>, JsonRejection>,
) -> Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let summary = services.orders.delete_many(&body.order_ids);
    Json(json!({
        "success": true,
        "deleted_count": summary.deleted,
        "missing": summary.missing,
    }))
    .into_response()
}

/// DELETE /orders/:order_id
pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> Response {
    match services.orders.delete_order(&order_id) {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Order {order_id} deleted"),
            "order_id": order_id,
        }))
        .into_response(),
        Err(e) => errors::order_error_to_response(e, Some(&order_id)),
    }
}

/// PUT /orders/:order_id/details
///
/// The path id wins over any id in the body.
pub async fn upsert_details(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    payload: Result<Json<OrderDetails>, JsonRejection>,
) -> Response {
    let mut details = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    details.order_id = order_id.clone();

    let total_products = details.total_products();
    match services.orders.upsert_details(details) {
        Ok(replaced) => Json(json!({
            "success": true,
            "order_id": order_id,
            "replaced": replaced,
            "total_products": total_products,
        }))
        .into_response(),
        Err(e) => errors::order_error_to_response(e, Some(&order_id)),
    }
}

/// GET /orders/:order_id/details
pub async fn get_details(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> Response {
    match services.orders.get_details(&order_id) {
        Ok(details) => Json(json!({ "success": true, "details": details })).into_response(),
        Err(e) => errors::order_error_to_response(e, Some(&order_id)),
    }
}

/// DELETE /orders/:order_id/details
pub async fn delete_details(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> Response {
    match services.orders.delete_details(&order_id) {
        Ok(()) => Json(json!({ "success": true, "order_id": order_id })).into_response(),
        Err(e) => errors::order_error_to_response(e, Some(&order_id)),
    }
}

/// GET /orders/items
pub async fn order_items(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let items = services.orders.items();
    Json(json!({
        "success": true,
        "total": items.len(),
        "items": items,
    }))
    .into_response()
}
