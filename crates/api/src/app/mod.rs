//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: long-lived components (stores, identity, sessions)
//! - `routes/`: `/api` handlers, one file per area
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses
//!
//! Anything no route matches is a page request and goes through
//! [`crate::pages::page`].

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::{middleware, pages};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServiceDeps, StartupError, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    routes::router().fallback(pages::page).layer(
        ServiceBuilder::new()
            .layer(Extension(services.clone()))
            .layer(axum::middleware::from_fn_with_state(services, middleware::access_gate)),
    )
}
