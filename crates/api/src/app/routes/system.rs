use std::sync::Arc;

use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "config": services.info,
        "worker": services.jobs.stats(),
    }))
}
