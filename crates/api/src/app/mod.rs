//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job store, dispatcher, order book and result writer
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON body helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around already-started services.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    routes::router().layer(ServiceBuilder::new().layer(Extension(services)))
}
