use serde::{Deserialize, Serialize};
use thiserror::Error;

use qrportal_core::{BranchId, CashierId, CompanyId, PrincipalId};

use crate::{Permission, PermissionSet, Role, with_role_defaults};

/// Custom claims attached to a principal by the trusted backend.
///
/// Every field is optional because claims accumulate over a user's lifetime
/// (an individual later becomes a company owner, a cashier is assigned a
/// branch, ...). Clients can read these but never write them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalClaims {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_role")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashier_id: Option<CashierId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashier_slug: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Role::parse))
}

impl PortalClaims {
    /// Role defaults merged into the embedded permissions.
    pub fn effective_permissions(&self) -> PermissionSet {
        with_role_defaults(self.role, &self.permissions)
    }

    /// Copy of these claims with `permissions` replaced; every scalar field is
    /// preserved.
    pub fn with_permissions(&self, permissions: &PermissionSet) -> PortalClaims {
        PortalClaims {
            permissions: permissions.to_vec(),
            ..self.clone()
        }
    }

    pub fn slug_context(&self) -> crate::routing::SlugContext<'_> {
        crate::routing::SlugContext {
            company_slug: non_empty(&self.company_slug),
            branch_slug: non_empty(&self.branch_slug),
            cashier_slug: non_empty(&self.cashier_slug),
        }
    }
}

pub(crate) fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Claims decoded from a verified provider token or session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedClaims {
    pub uid: PrincipalId,
    #[serde(default)]
    pub email: Option<String>,
    /// Seconds since epoch.
    pub issued_at: i64,
    /// Seconds since epoch.
    pub expires_at: i64,
    #[serde(default)]
    pub claims: PortalClaims,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Allowed clock skew when checking `issued_at`, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

/// Deterministically validate the time window of decoded claims.
///
/// Signature verification happens in the identity provider; this only checks
/// the claims themselves.
pub fn validate_claims(claims: &DecodedClaims, now_secs: i64) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now_secs + CLOCK_SKEW_SECS < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now_secs >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
