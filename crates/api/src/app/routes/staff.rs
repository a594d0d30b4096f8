//! `/api/staff/*`: staff sessions.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use qrportal_auth::cookies::STAFF_SESSION_COOKIE;

use crate::app::routes::with_cookies;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{RequestCookies, StaffSession};

pub fn router() -> Router {
    Router::new()
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/me", get(me))
}

pub async fn signin(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StaffSigninRequest>,
) -> Response {
    let staff = match services.accounts.verify_staff(&body.username, &body.password).await {
        Ok(staff) => staff,
        Err(err) => return errors::portal_error_to_response(err),
    };
    let grant = match services.staff_sessions.create(&staff.id, None).await {
        Ok(grant) => grant,
        Err(err) => return errors::portal_error_to_response(err.into()),
    };
    info!(staff_id = %staff.id, "staff signed in");

    let cookie = services
        .opaque_cookies
        .set_cookie(STAFF_SESSION_COOKIE, &grant.session_id, grant.max_age, true);
    with_cookies(
        Json(json!({ "ok": true, "staff": staff.profile() })).into_response(),
        [cookie],
    )
}

pub async fn signout(Extension(services): Extension<Arc<AppServices>>, cookies: RequestCookies) -> Response {
    if let Some(session_id) = cookies.get(STAFF_SESSION_COOKIE) {
        if let Err(err) = services.staff_sessions.destroy(session_id).await {
            warn!(error = %err, "could not destroy staff session");
        }
    }
    with_cookies(
        Json(json!({ "ok": true })).into_response(),
        [services.opaque_cookies.clear_cookie(STAFF_SESSION_COOKIE, true)],
    )
}

pub async fn me(session: StaffSession) -> Response {
    Json(json!({ "ok": true, "staff": session.staff.profile() })).into_response()
}
