//! `/api/session/*`: provider session cookie lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use qrportal_auth::cookies::{DEFAULT_SESSION_TTL, SESSION_COOKIE, TOKEN_COOKIE, USER_ID_COOKIE};
use qrportal_core::PrincipalId;
use qrportal_infra::{IdentityError, SessionCookie};

use crate::app::routes::with_cookies;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{CurrentUser, RequestCookies};

pub fn router() -> Router {
    Router::new()
        .route("/verify", get(verify))
        .route("/create", post(create))
        .route("/destroy", post(destroy))
        .route("/refresh", post(refresh))
}

fn identity_failure(err: IdentityError) -> Response {
    match err {
        IdentityError::InvalidToken(reason) | IdentityError::InvalidSession(reason) => {
            warn!(%reason, "session token rejected");
            errors::unauthorized()
        }
        other => errors::portal_error_to_response(other.into()),
    }
}

fn session_cookie_header(services: &AppServices, cookie: &SessionCookie) -> String {
    services
        .provider_cookies
        .set_cookie(SESSION_COOKIE, &cookie.value, cookie.max_age, true)
}

pub async fn verify(CurrentUser(user): CurrentUser) -> Response {
    Json(dto::SessionInfo::from_user(user)).into_response()
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateSessionRequest>,
) -> Response {
    let ttl = body.expires_in.map(Duration::from_millis).unwrap_or(DEFAULT_SESSION_TTL);
    let cookie = match services.identity.create_session_cookie(&body.id_token, ttl).await {
        Ok(cookie) => cookie,
        Err(err) => return identity_failure(err),
    };
    let decoded = match services.identity.verify_session_cookie(&cookie.value, false).await {
        Ok(decoded) => decoded,
        Err(err) => return identity_failure(err),
    };
    let grant = match services.user_sessions.create(&decoded.uid, Some(cookie.max_age)).await {
        Ok(grant) => grant,
        Err(err) => return errors::portal_error_to_response(err.into()),
    };
    info!(uid = %decoded.uid, "user session created");

    let policy = services.provider_cookies;
    let res = Json(json!({ "ok": true, "uid": decoded.uid })).into_response();
    with_cookies(
        res,
        [
            session_cookie_header(&services, &cookie),
            policy.set_cookie(TOKEN_COOKIE, &grant.session_id, grant.max_age, true),
            policy.set_cookie(USER_ID_COOKIE, decoded.uid.as_str(), cookie.max_age, false),
        ],
    )
}

/// Always succeeds; cookies are cleared even when nothing could be revoked.
pub async fn destroy(Extension(services): Extension<Arc<AppServices>>, cookies: RequestCookies) -> Response {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if let Ok(decoded) = services.identity.verify_session_cookie(cookie, false).await {
            match services.identity.provider().revoke_sessions(&decoded.uid).await {
                Ok(()) => {
                    services.metrics.session_revoked();
                    info!(uid = %decoded.uid, "provider sessions revoked");
                }
                Err(err) => warn!(uid = %decoded.uid, error = %err, "could not revoke sessions"),
            }
        }
    }
    if let Some(token) = cookies.get(TOKEN_COOKIE) {
        if let Err(err) = services.user_sessions.destroy(token).await {
            warn!(error = %err, "could not destroy user session");
        }
    }

    let policy = services.provider_cookies;
    with_cookies(
        Json(json!({ "ok": true })).into_response(),
        [
            policy.clear_cookie(SESSION_COOKIE, true),
            policy.clear_cookie(TOKEN_COOKIE, true),
            policy.clear_cookie(USER_ID_COOKIE, false),
        ],
    )
}

/// Re-mint the session cookie so claims changed since sign-in take effect.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    cookies: RequestCookies,
    body: Option<Json<dto::RefreshSessionRequest>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let minted = match body.id_token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(id_token) => services.identity.create_session_cookie(id_token, DEFAULT_SESSION_TTL).await,
        None => match current_uid(&services, &cookies).await {
            Some(uid) => services.identity.mint_session_for(&uid, DEFAULT_SESSION_TTL).await,
            None => return errors::unauthorized(),
        },
    };
    let cookie = match minted {
        Ok(cookie) => cookie,
        Err(err) => return identity_failure(err),
    };

    with_cookies(
        Json(json!({ "ok": true })).into_response(),
        [session_cookie_header(&services, &cookie)],
    )
}

async fn current_uid(services: &AppServices, cookies: &RequestCookies) -> Option<PrincipalId> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    services
        .identity
        .verify_session_cookie(cookie, true)
        .await
        .ok()
        .map(|decoded| decoded.uid)
}
