use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use qrportal_auth::GateDecision;

use crate::app::services::AppServices;
use crate::context::RequestCookies;

/// Cookie-presence gate in front of every page route.
pub async fn access_gate(State(services): State<Arc<AppServices>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let cookies = RequestCookies::from_headers(req.headers());

    match services.gate.check(&path, |name| cookies.has(name)) {
        GateDecision::Pass => next.run(req).await,
        GateDecision::Redirect(location) => {
            debug!(%path, %location, "no session cookie; redirecting");
            found(&location)
        }
    }
}

/// `302 Found` with a `Location` header.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
