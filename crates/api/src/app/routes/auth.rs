//! `/api/auth/*`: custom tokens for cross-origin clients, invite redemption
//! and PIN checks.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use qrportal_auth::Role;
use qrportal_core::PortalError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{CurrentUser, RequestCookies, resolve_user};

pub fn router() -> Router {
    Router::new()
        .route("/custom-token", get(custom_token).options(custom_token_preflight))
        .route("/set-password", post(set_password))
        .route("/set-pin", post(set_pin))
        .route("/verify-pin", post(verify_pin))
}

enum OriginCheck {
    /// No `Origin` header: same-origin request.
    SameOrigin,
    Allowed(HeaderValue),
    Rejected,
}

fn check_origin(services: &AppServices, headers: &HeaderMap) -> OriginCheck {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return OriginCheck::SameOrigin;
    };
    match origin.to_str() {
        Ok(raw) if services.config.is_origin_allowed(raw) => OriginCheck::Allowed(origin.clone()),
        _ => OriginCheck::Rejected,
    }
}

fn with_cors(mut res: Response, origin: &OriginCheck) -> Response {
    if let OriginCheck::Allowed(origin) = origin {
        let headers = res.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    res
}

pub async fn custom_token_preflight(Extension(services): Extension<Arc<AppServices>>, headers: HeaderMap) -> Response {
    let origin = check_origin(&services, &headers);
    if let OriginCheck::Rejected = origin {
        return StatusCode::FORBIDDEN.into_response();
    }
    let mut res = StatusCode::NO_CONTENT.into_response();
    let h = res.headers_mut();
    h.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, OPTIONS"));
    h.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    h.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
    with_cors(res, &origin)
}

/// Custom token for the current session, so a client on another allowed
/// origin can sign in to the provider as the same user.
pub async fn custom_token(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    cookies: RequestCookies,
) -> Response {
    let origin = check_origin(&services, &headers);
    if let OriginCheck::Rejected = origin {
        warn!("custom token requested from a disallowed origin");
        return errors::json_error(StatusCode::FORBIDDEN, "Origin not allowed");
    }

    let res = match resolve_user(&services, &cookies).await {
        None => errors::unauthorized(),
        Some(user) => match services.identity.create_custom_token(&user.uid).await {
            Ok(token) => {
                let mut res = Json(json!({ "ok": true, "token": token })).into_response();
                res.headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                res
            }
            Err(err) => errors::portal_error_to_response(err.into()),
        },
    };
    with_cors(res, &origin)
}

pub async fn set_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SetPasswordRequest>,
) -> Response {
    match services.invites.redeem_password(&body.token, &body.password).await {
        Ok(kind) => Json(json!({ "ok": true, "kind": kind })).into_response(),
        Err(err) => errors::portal_error_to_response(err),
    }
}

pub async fn set_pin(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SetPinRequest>,
) -> Response {
    match services.invites.redeem_pin(&body.token, &body.pin).await {
        Ok(kind) => Json(json!({ "ok": true, "kind": kind })).into_response(),
        Err(err) => errors::portal_error_to_response(err),
    }
}

/// Branch managers confirm sensitive till actions with their PIN.
pub async fn verify_pin(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<dto::VerifyPinRequest>,
) -> Response {
    if user.claims.role != Some(Role::BranchManager) {
        return errors::portal_error_to_response(PortalError::NotAuthorized);
    }
    match services.accounts.verify_pin(&user.uid, &body.pin).await {
        Ok(()) => {
            info!(uid = %user.uid, "pin verified");
            Json(json!({ "ok": true })).into_response()
        }
        Err(err) => errors::portal_error_to_response(err),
    }
}
