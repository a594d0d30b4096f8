//! Page routes: everything the router does not match explicitly.
//!
//! A page response is a JSON shell `{ok, page, role, permission}`; the
//! front-end renders the actual page. Guards decide whether it is served.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use qrportal_auth::cookies::{ADMIN_SESSION_COOKIE, STAFF_SESSION_COOKIE};
use qrportal_auth::gate::{is_bypassed, signin_redirect};
use qrportal_auth::guard::{self, canonical_slugs, evaluate_top_level};
use qrportal_auth::{GuardOutcome, Role, TenantRequest, required_permission_for_path};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::{RequestCookies, resolve_user};
use crate::middleware::found;

const USER_SIGNIN: &str = "/signin";

pub async fn page(Extension(services): Extension<Arc<AppServices>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") || is_bypassed(path) {
        return errors::json_error(StatusCode::NOT_FOUND, "Not found");
    }
    let cookies = RequestCookies::from_headers(&headers);

    if let Some(rule) = services.gate.rule_for(path) {
        if path == rule.signin_path || path.starts_with(&format!("{}/", rule.signin_path)) {
            return public_page(path);
        }
        return match rule.prefix {
            "/admin" => admin_page(&services, &cookies, path).await,
            "/staff" => staff_page(&services, &cookies, path).await,
            _ => top_level_page(&services, &cookies, path).await,
        };
    }

    match TenantRequest::parse(path) {
        Some(request) => tenant_page(&services, &cookies, &request).await,
        None => public_page(path),
    }
}

async fn admin_page(services: &AppServices, cookies: &RequestCookies, path: &str) -> Response {
    let admin = match cookies.get(ADMIN_SESSION_COOKIE) {
        Some(id) => services.admin_sessions.resolve(id).await,
        None => None,
    };
    match admin {
        Some(_) => shell(path, Some("admin"), None),
        None => found(&signin_redirect("/admin/signin", path)),
    }
}

async fn staff_page(services: &AppServices, cookies: &RequestCookies, path: &str) -> Response {
    let staff = match cookies.get(STAFF_SESSION_COOKIE) {
        Some(id) => services.staff_sessions.resolve(id).await,
        None => None,
    };
    match staff {
        Some(_) => shell(path, Some("staff"), None),
        None => found(&signin_redirect("/staff/signin", path)),
    }
}

async fn top_level_page(services: &AppServices, cookies: &RequestCookies, path: &str) -> Response {
    let Some(user) = resolve_user(services, cookies).await else {
        return found(&signin_redirect(USER_SIGNIN, path));
    };
    let outcome = evaluate_top_level(&user.claims, path);
    render(outcome, path, user.claims.role)
}

async fn tenant_page(services: &AppServices, cookies: &RequestCookies, request: &TenantRequest) -> Response {
    let path = request.path();
    let Some(user) = resolve_user(services, cookies).await else {
        return found(&signin_redirect(USER_SIGNIN, &path));
    };
    let role = user.claims.role;

    let slugs = match canonical_slugs(request.layout, &user.claims) {
        Ok(slugs) => slugs,
        Err(outcome) => return render(outcome, &path, role),
    };
    let resolved = match services.tenants.resolve(&slugs).await {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(error = %err, %path, "tenant lookup failed");
            return found(USER_SIGNIN);
        }
    };

    let outcome = guard::evaluate(&user.uid, &user.claims, request, &resolved);
    render(outcome, &path, role)
}

fn render(outcome: GuardOutcome, path: &str, role: Option<Role>) -> Response {
    match outcome {
        GuardOutcome::Allow => {
            let permission = required_permission_for_path(path).map(|p| p.as_str().to_string());
            shell(path, role.map(|r| r.as_str()), permission)
        }
        GuardOutcome::Redirect(location) => found(&location),
        GuardOutcome::Deny(reason) => {
            warn!(%reason, %path, "page guard denied");
            found(USER_SIGNIN)
        }
    }
}

fn shell(path: &str, role: Option<&str>, permission: Option<String>) -> Response {
    Json(json!({
        "ok": true,
        "page": path,
        "role": role,
        "permission": permission,
    }))
    .into_response()
}

fn public_page(path: &str) -> Response {
    Json(json!({ "ok": true, "page": path })).into_response()
}
