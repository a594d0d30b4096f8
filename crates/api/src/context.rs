//! Per-request authentication context, extracted from cookies.
//!
//! Extractors read `Arc<AppServices>` from the request extensions (installed
//! by `build_app`) and reject with `401 {ok:false}` when no valid session is
//! present.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Response;

use qrportal_auth::cookies::{ADMIN_SESSION_COOKIE, SESSION_COOKIE, STAFF_SESSION_COOKIE, TOKEN_COOKIE, get_cookie};
use qrportal_auth::{AdminAccount, StaffAccount};
use qrportal_infra::{VerifiedUser, resolve_session_claims};

use crate::app::errors;
use crate::app::services::AppServices;

/// All `Cookie` headers of a request, joined.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    raw: String,
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let raw = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        Self { raw }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        get_cookie(&self.raw, name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestCookies {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestCookies::from_headers(&parts.headers))
    }
}

fn services_from(parts: &Parts) -> Result<Arc<AppServices>, Response> {
    parts
        .extensions
        .get::<Arc<AppServices>>()
        .cloned()
        .ok_or_else(|| errors::json_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"))
}

/// The portal user behind the `session` cookie, claims healed.
///
/// A `token` cookie, when present, must name a live user session of the same
/// principal; a stale or foreign one fails the whole resolution.
pub async fn resolve_user(services: &AppServices, cookies: &RequestCookies) -> Option<VerifiedUser> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    let user = resolve_session_claims(
        &services.identity,
        &services.metrics,
        &services.reconciled_claims,
        cookie,
    )
    .await?;
    if let Some(token) = cookies.get(TOKEN_COOKIE) {
        let record = services.user_sessions.resolve_record(token).await?;
        if record.principal_id != user.uid {
            return None;
        }
    }
    Some(user)
}

/// Authenticated portal user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub VerifiedUser);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let services = services_from(parts)?;
        let cookies = RequestCookies::from_headers(&parts.headers);
        resolve_user(&services, &cookies)
            .await
            .map(CurrentUser)
            .ok_or_else(errors::unauthorized)
    }
}

/// Signed-in administrator.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin: AdminAccount,
    pub session_id: String,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let services = services_from(parts)?;
        let cookies = RequestCookies::from_headers(&parts.headers);
        let session_id = cookies.get(ADMIN_SESSION_COOKIE).ok_or_else(errors::unauthorized)?;
        let admin = services
            .admin_sessions
            .resolve(session_id)
            .await
            .ok_or_else(errors::unauthorized)?;
        Ok(AdminSession {
            admin,
            session_id: session_id.to_string(),
        })
    }
}

/// Signed-in staff member.
#[derive(Debug, Clone)]
pub struct StaffSession {
    pub staff: StaffAccount,
    pub session_id: String,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for StaffSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let services = services_from(parts)?;
        let cookies = RequestCookies::from_headers(&parts.headers);
        let session_id = cookies.get(STAFF_SESSION_COOKIE).ok_or_else(errors::unauthorized)?;
        let staff = services
            .staff_sessions
            .resolve(session_id)
            .await
            .ok_or_else(errors::unauthorized)?;
        Ok(StaffSession {
            staff,
            session_id: session_id.to_string(),
        })
    }
}
