use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Auth counters. Not served in production.
pub async fn debug_metrics(Extension(services): Extension<Arc<AppServices>>) -> Response {
    if services.config.production {
        return errors::json_error(StatusCode::NOT_FOUND, "Not found");
    }
    Json(json!({
        "ok": true,
        "metrics": services.metrics.snapshot(),
        "pendingCleanup": services.cleanup.pending(),
    }))
    .into_response()
}
