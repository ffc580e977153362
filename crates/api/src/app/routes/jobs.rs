use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::app::errors::{self, Response};
use crate::app::services::AppServices;
use crate::app::dto;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_job).get(list_jobs).delete(clear_jobs))
        .route("/:job_id", get(get_job).delete(delete_job))
        .route("/:job_id/stop", post(stop_job))
        .route("/:job_id/retry", post(retry_job))
}

/// POST /jobs
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::SubmitJobRequest>, JsonRejection>,
) -> Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services.jobs.submit(body.items) {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": format!("Queued job for {} items", job.total),
                "job": job,
            })),
        )
            .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// GET /jobs
pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.jobs.list() {
        Ok(jobs) => Json(json!({ "success": true, "jobs": jobs })).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// DELETE /jobs
pub async fn clear_jobs(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.jobs.clear() {
        Ok(n) => Json(json!({
            "success": true,
            "message": format!("Cleared {n} jobs"),
            "deleted_count": n,
        }))
        .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// GET /jobs/:job_id
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match errors::parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.jobs.status(id) {
        Ok(job) => Json(json!({ "success": true, "job": job })).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// POST /jobs/:job_id/stop
pub async fn stop_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match errors::parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.jobs.stop(id) {
        Ok(job) => Json(json!({
            "success": true,
            "message": format!("Stop requested for job {id}"),
            "job": job,
        }))
        .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// POST /jobs/:job_id/retry
pub async fn retry_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match errors::parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.jobs.retry(id) {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": format!("Job {id} queued for retry"),
                "job": job,
            })),
        )
            .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// DELETE /jobs/:job_id
pub async fn delete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = match errors::parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.jobs.delete(id) {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Job {id} deleted"),
            "job_id": id,
        }))
        .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}
