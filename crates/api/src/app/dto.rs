use serde::{Deserialize, Serialize};

use qrportal_auth::{InviteKind, PortalClaims};
use qrportal_core::{BranchId, CompanyId, PrincipalId};
use qrportal_infra::VerifiedUser;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub id_token: String,
    /// Milliseconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPinRequest {
    pub token: String,
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminSigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct StaffSigninRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub email: String,
    pub kind: InviteKind,
    pub principal_id: PrincipalId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStaffRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

// -------------------------
// Response DTOs
// -------------------------

/// Body of a successful `GET /api/session/verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub ok: bool,
    pub uid: PrincipalId,
    pub email: Option<String>,
    pub role: Option<&'static str>,
    pub account_type: Option<String>,
    pub company_id: Option<CompanyId>,
    pub company_slug: Option<String>,
    pub branch_id: Option<BranchId>,
    pub branch_slug: Option<String>,
    pub cashier_slug: Option<String>,
    pub permissions: Vec<String>,
}

impl SessionInfo {
    pub fn from_user(user: VerifiedUser) -> Self {
        let VerifiedUser {
            uid,
            email,
            claims,
            permissions,
        } = user;
        let PortalClaims {
            role,
            account_type,
            company_id,
            company_slug,
            branch_id,
            branch_slug,
            cashier_slug,
            ..
        } = claims;
        Self {
            ok: true,
            uid,
            email,
            role: role.map(|r| r.as_str()),
            account_type,
            company_id,
            company_slug,
            branch_id,
            branch_slug,
            cashier_slug,
            permissions: permissions.to_strings(),
        }
    }
}

