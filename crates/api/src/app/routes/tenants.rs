//! `/api/companies/*`: tenant provisioning. Each call also writes the new
//! role's claims; the affected user picks them up on the next refresh.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;

use qrportal_infra::{NewBranch, NewCashier, NewCompany};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_company))
        .route("/:company/branches", post(create_branch))
        .route("/:company/branches/:branch/cashiers", post(create_cashier))
}

fn created(key: &str, value: impl serde::Serialize) -> Response {
    let mut body = serde_json::Map::new();
    body.insert("ok".into(), json!(true));
    body.insert(key.into(), json!(value));
    (StatusCode::CREATED, Json(body)).into_response()
}

pub async fn create_company(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewCompany>,
) -> Response {
    match services.tenants.create_company(&user.uid, body).await {
        Ok(company) => created("company", company),
        Err(err) => errors::portal_error_to_response(err),
    }
}

pub async fn create_branch(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Path(company): Path<String>,
    Json(body): Json<NewBranch>,
) -> Response {
    match services.tenants.create_branch(&user.uid, &company, body).await {
        Ok(branch) => created("branch", branch),
        Err(err) => errors::portal_error_to_response(err),
    }
}

pub async fn create_cashier(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentUser(user): CurrentUser,
    Path((company, branch)): Path<(String, String)>,
    Json(body): Json<NewCashier>,
) -> Response {
    match services.tenants.create_cashier(&user.uid, &company, &branch, body).await {
        Ok(cashier) => created("cashier", cashier),
        Err(err) => errors::portal_error_to_response(err),
    }
}
