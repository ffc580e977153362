use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use crawlnet_core::DomainError;
use crawlnet_infra::jobs::{JobError, JobStoreError};
use crawlnet_infra::sink::SinkError;

pub type Response = axum::response::Response;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with(status, code, message, None)
}

/// Error body carrying the key of the resource it is about.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    key: Option<(&'static str, String)>,
) -> Response {
    let mut body = json!({
        "success": false,
        "error": code,
        "message": message.into(),
    });
    if let (Some((name, value)), Value::Object(map)) = (key, &mut body) {
        map.insert(name.to_string(), Value::String(value));
    }
    (status, axum::Json(body)).into_response()
}

pub fn job_error_to_response(err: JobError) -> Response {
    let message = err.to_string();
    match err {
        JobError::NotFound(id) => json_error_with(
            StatusCode::NOT_FOUND,
            "job_not_found",
            message,
            Some(("job_id", id.to_string())),
        ),
        JobError::Conflict { active, .. } => json_error_with(
            StatusCode::CONFLICT,
            "job_active",
            message,
            Some(("job_id", active.to_string())),
        ),
        JobError::Domain { job_id, .. } => json_error_with(
            StatusCode::CONFLICT,
            "invalid_transition",
            message,
            Some(("job_id", job_id.to_string())),
        ),
        JobError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        JobError::ShuttingDown => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "shutting_down", message)
        }
        JobError::Store(JobStoreError::NotFound(id)) => json_error_with(
            StatusCode::NOT_FOUND,
            "job_not_found",
            message,
            Some(("job_id", id.to_string())),
        ),
        JobError::Store(_) => {
            tracing::error!(error = %message, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn order_error_to_response(err: DomainError, order_id: Option<&str>) -> Response {
    let key = order_id.map(|id| ("order_id", id.to_string()));
    match err {
        DomainError::NotFound => json_error_with(
            StatusCode::NOT_FOUND,
            "order_not_found",
            match order_id {
                Some(id) => format!("no stored data for order {id}"),
                None => "order not found".to_string(),
            },
            key,
        ),
        DomainError::Validation(msg) => {
            json_error_with(StatusCode::BAD_REQUEST, "validation_error", msg, key)
        }
        other => json_error_with(StatusCode::CONFLICT, "conflict", other.to_string(), key),
    }
}

pub fn sink_error_to_response(err: SinkError, filename: &str) -> Response {
    let key = Some(("filename", filename.to_string()));
    match err {
        SinkError::InvalidName(_) => json_error_with(
            StatusCode::BAD_REQUEST,
            "invalid_filename",
            err.to_string(),
            key,
        ),
        SinkError::NotFound(_) => json_error_with(
            StatusCode::NOT_FOUND,
            "file_not_found",
            err.to_string(),
            key,
        ),
        other => {
            tracing::error!(filename, error = %other, "failed to read result file");
            json_error_with(
                StatusCode::INTERNAL_SERVER_ERROR,
                "file_error",
                other.to_string(),
                key,
            )
        }
    }
}

pub fn parse_job_id(raw: &str) -> Result<crawlnet_core::JobId, Response> {
    raw.parse().map_err(|_| {
        json_error_with(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            "invalid job id",
            Some(("job_id", raw.to_string())),
        )
    })
}
