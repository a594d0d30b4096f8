use axum::{
    http::{HeaderValue, header::SET_COOKIE},
    response::Response,
    routing::get,
    Router,
};
use tracing::warn;

pub mod admin;
pub mod auth;
pub mod session;
pub mod staff;
pub mod system;
pub mod tenants;

/// Router for every `/api` endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/api/session", session::router())
        .nest("/api/auth", auth::router())
        .nest("/api/admin", admin::router())
        .nest("/api/staff", staff::router())
        .nest("/api/companies", tenants::router())
        .route("/api/debug/metrics", get(system::debug_metrics))
        .route("/health", get(system::health))
}

/// Append one `Set-Cookie` header per cookie.
pub(crate) fn with_cookies(mut res: Response, cookies: impl IntoIterator<Item = String>) -> Response {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                res.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "dropping unencodable cookie"),
        }
    }
    res
}
