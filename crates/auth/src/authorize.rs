use thiserror::Error;

use qrportal_core::{BranchId, CompanyId, PortalError};

use crate::{Permission, PortalClaims, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("missing context: {0}")]
    MissingContext(&'static str),
}

impl From<AuthzError> for PortalError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::MissingContext(field) => PortalError::missing(field),
            _ => PortalError::NotAuthorized,
        }
    }
}

/// Check a permission against claims, role defaults included.
///
/// - No IO
/// - No panics
pub fn authorize(claims: &PortalClaims, required: &Permission) -> Result<(), AuthzError> {
    if claims.effective_permissions().contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// The caller owns `company_id` and holds `required`.
pub fn authorize_company(
    claims: &PortalClaims,
    company_id: &CompanyId,
    required: &Permission,
) -> Result<(), AuthzError> {
    authorize(claims, required)?;
    if claims.role != Some(Role::CompanyOwner) {
        return Err(AuthzError::TenantMismatch);
    }
    let claimed = claims
        .company_id
        .as_ref()
        .ok_or(AuthzError::MissingContext("companyId"))?;
    if claimed != company_id {
        return Err(AuthzError::TenantMismatch);
    }
    Ok(())
}

/// The caller owns the branch's company, or manages the branch itself.
pub fn authorize_branch(
    claims: &PortalClaims,
    company_id: &CompanyId,
    branch_id: &BranchId,
    required: &Permission,
) -> Result<(), AuthzError> {
    authorize(claims, required)?;
    let claimed_company = claims
        .company_id
        .as_ref()
        .ok_or(AuthzError::MissingContext("companyId"))?;
    if claimed_company != company_id {
        return Err(AuthzError::TenantMismatch);
    }
    match claims.role {
        Some(Role::CompanyOwner) => Ok(()),
        Some(Role::BranchManager) => {
            let claimed_branch = claims
                .branch_id
                .as_ref()
                .ok_or(AuthzError::MissingContext("branchId"))?;
            if claimed_branch == branch_id {
                Ok(())
            } else {
                Err(AuthzError::TenantMismatch)
            }
        }
        _ => Err(AuthzError::TenantMismatch),
    }
}
