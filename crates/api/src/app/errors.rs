use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use qrportal_core::PortalError;

/// Every error body is `{ ok: false, message }`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "ok": false,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthorized() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "Unauthorized")
}

pub fn status_for(err: &PortalError) -> StatusCode {
    match err {
        PortalError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        PortalError::InvalidOrExpiredToken(_) => StatusCode::BAD_REQUEST,
        PortalError::NotAuthorized => StatusCode::FORBIDDEN,
        PortalError::MissingContext(_) => StatusCode::BAD_REQUEST,
        PortalError::Validation(_) => StatusCode::BAD_REQUEST,
        PortalError::NotFound => StatusCode::NOT_FOUND,
        PortalError::Conflict(_) => StatusCode::CONFLICT,
        PortalError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Server details are logged here and never rendered.
pub fn portal_error_to_response(err: PortalError) -> axum::response::Response {
    if let PortalError::Server(detail) = &err {
        error!(detail = %detail, "request failed");
    }
    json_error(status_for(&err), err.public_message())
}
