use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::app::errors::{self, Response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:filename", get(download))
}

/// GET /files/:filename
pub async fn download(
    Extension(services): Extension<Arc<AppServices>>,
    Path(filename): Path<String>,
) -> Response {
    match services.results.read(&filename) {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => errors::sink_error_to_response(e, &filename),
    }
}
