//! `/api/admin/*`: administrator sessions and account provisioning.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use qrportal_auth::cookies::ADMIN_SESSION_COOKIE;

use crate::app::routes::with_cookies;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AdminSession, RequestCookies};

pub fn router() -> Router {
    Router::new()
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/me", get(me))
        .route("/invites", post(create_invite))
        .route("/admins", post(create_admin))
        .route("/staff", post(create_staff))
}

pub async fn signin(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::AdminSigninRequest>,
) -> Response {
    let admin = match services.accounts.verify_admin(&body.email, &body.password).await {
        Ok(admin) => admin,
        Err(err) => return errors::portal_error_to_response(err),
    };
    let grant = match services.admin_sessions.create(&admin.id, None).await {
        Ok(grant) => grant,
        Err(err) => return errors::portal_error_to_response(err.into()),
    };
    info!(admin_id = %admin.id, "admin signed in");

    let cookie = services
        .opaque_cookies
        .set_cookie(ADMIN_SESSION_COOKIE, &grant.session_id, grant.max_age, true);
    with_cookies(
        Json(json!({ "ok": true, "admin": admin.profile() })).into_response(),
        [cookie],
    )
}

pub async fn signout(Extension(services): Extension<Arc<AppServices>>, cookies: RequestCookies) -> Response {
    if let Some(session_id) = cookies.get(ADMIN_SESSION_COOKIE) {
        if let Err(err) = services.admin_sessions.destroy(session_id).await {
            warn!(error = %err, "could not destroy admin session");
        }
    }
    with_cookies(
        Json(json!({ "ok": true })).into_response(),
        [services.opaque_cookies.clear_cookie(ADMIN_SESSION_COOKIE, true)],
    )
}

pub async fn me(session: AdminSession) -> Response {
    Json(json!({ "ok": true, "admin": session.admin.profile() })).into_response()
}

/// Issue an invite. Outside production the link is echoed back so it can be
/// used without a mail server.
pub async fn create_invite(
    Extension(services): Extension<Arc<AppServices>>,
    session: AdminSession,
    Json(body): Json<dto::CreateInviteRequest>,
) -> Response {
    let issued = match services.invites.issue(body.kind, &body.email, body.principal_id).await {
        Ok(issued) => issued,
        Err(err) => return errors::portal_error_to_response(err),
    };
    info!(admin_id = %session.admin.id, kind = ?issued.record.kind, "invite created by admin");

    let link = (!services.config.production).then(|| services.invites.link_for(issued.record.kind, &issued.secret));
    (
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "kind": issued.record.kind,
            "expiresAtMs": issued.record.expires_at_ms,
            "link": link,
        })),
    )
        .into_response()
}

pub async fn create_admin(
    Extension(services): Extension<Arc<AppServices>>,
    _session: AdminSession,
    Json(body): Json<dto::CreateAdminRequest>,
) -> Response {
    match services.accounts.create_admin(&body.email, &body.display_name).await {
        Ok(admin) => (StatusCode::CREATED, Json(json!({ "ok": true, "admin": admin.profile() }))).into_response(),
        Err(err) => errors::portal_error_to_response(err),
    }
}

pub async fn create_staff(
    Extension(services): Extension<Arc<AppServices>>,
    _session: AdminSession,
    Json(body): Json<dto::CreateStaffRequest>,
) -> Response {
    match services
        .accounts
        .create_staff(&body.username, &body.display_name, body.company_id)
        .await
    {
        Ok(staff) => (StatusCode::CREATED, Json(json!({ "ok": true, "staff": staff.profile() }))).into_response(),
        Err(err) => errors::portal_error_to_response(err),
    }
}
