use axum::{routing::get, Router};

pub mod files;
pub mod jobs;
pub mod orders;
pub mod system;

/// Router for every endpoint; services arrive via `Extension`.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/jobs", jobs::router())
        .nest("/orders", orders::router())
        .nest("/files", files::router())
}
