//! Slug-scoped page guards.
//!
//! Guards are pure decisions over already-resolved inputs: the caller resolves
//! the session to claims, asks [`canonical_slugs`] which tenant entities to
//! load, loads them, and hands everything to [`evaluate`]. The result is a
//! tagged [`GuardOutcome`]; translating it to an HTTP redirect is the
//! boundary's job.

use qrportal_core::{Branch, Cashier, Company, PrincipalId};

use crate::claims::{PortalClaims, non_empty};
use crate::routing::{default_route_for_role, is_reserved_root, path_segments, required_permission_for_path};
use crate::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect(String),
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoSession,
    MissingContext,
    TenantNotFound,
    TenantMismatch,
    MissingPermission,
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DenyReason::NoSession => "no session",
            DenyReason::MissingContext => "claims lack tenant ids",
            DenyReason::TenantNotFound => "tenant entity not found",
            DenyReason::TenantMismatch => "claims do not match tenant records",
            DenyReason::MissingPermission => "missing permission",
        })
    }
}

/// Which tenant layout a path renders under, and thus which role it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Company,
    Branch,
    Cashier,
}

impl Layout {
    pub fn required_role(self) -> Role {
        match self {
            Layout::Company => Role::CompanyOwner,
            Layout::Branch => Role::BranchManager,
            Layout::Cashier => Role::Cashier,
        }
    }
}

/// A tenant-scoped page request parsed from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRequest {
    pub layout: Layout,
    pub company_slug: String,
    pub branch_slug: Option<String>,
    pub cashier_slug: Option<String>,
    /// Remainder after the layout's slug segments, e.g. `/transactions`.
    pub rest: String,
}

const COMPANY_PAGES: &[&str] = &["branches", "profile", "settings"];
const BRANCH_PAGES: &[&str] = &["profile", "settings"];

fn join_rest(segments: &[&str]) -> String {
    segments.iter().map(|s| format!("/{s}")).collect()
}

impl TenantRequest {
    /// Parse `/{company}[/{branch}[/{cashier}[/…]]]`. Reserved first segments
    /// are not tenant paths.
    pub fn parse(pathname: &str) -> Option<TenantRequest> {
        let segs = path_segments(pathname);
        let company = *segs.first()?;
        if is_reserved_root(company) {
            return None;
        }
        let company_slug = company.to_string();

        if segs.len() == 1 || COMPANY_PAGES.contains(&segs[1]) {
            return Some(TenantRequest {
                layout: Layout::Company,
                company_slug,
                branch_slug: None,
                cashier_slug: None,
                rest: join_rest(&segs[1..]),
            });
        }

        let branch_slug = Some(segs[1].to_string());
        if segs.len() == 2 || (segs.len() == 3 && BRANCH_PAGES.contains(&segs[2])) {
            return Some(TenantRequest {
                layout: Layout::Branch,
                company_slug,
                branch_slug,
                cashier_slug: None,
                rest: join_rest(&segs[2..]),
            });
        }

        Some(TenantRequest {
            layout: Layout::Cashier,
            company_slug,
            branch_slug,
            cashier_slug: Some(segs[2].to_string()),
            rest: join_rest(&segs[3..]),
        })
    }

    pub fn path(&self) -> String {
        let mut out = format!("/{}", self.company_slug);
        if let Some(b) = &self.branch_slug {
            out.push('/');
            out.push_str(b);
        }
        if let Some(k) = &self.cashier_slug {
            out.push('/');
            out.push_str(k);
        }
        out.push_str(&self.rest);
        out
    }
}

/// Canonical slugs from claims, validated for the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSlugs {
    pub company: String,
    pub branch: Option<String>,
    pub cashier: Option<String>,
}

/// Tenant entities the caller resolved from the canonical slugs.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTenant {
    pub company: Option<Company>,
    pub branch: Option<Branch>,
    pub cashier: Option<Cashier>,
}

fn role_default(claims: &PortalClaims) -> String {
    default_route_for_role(claims.role, claims.slug_context())
}

/// Step one: exact role match and presence of every slug the layout needs.
pub fn canonical_slugs(layout: Layout, claims: &PortalClaims) -> Result<CanonicalSlugs, GuardOutcome> {
    if claims.role != Some(layout.required_role()) {
        return Err(GuardOutcome::Redirect(role_default(claims)));
    }
    let company = non_empty(&claims.company_slug);
    let branch = non_empty(&claims.branch_slug);
    let cashier = non_empty(&claims.cashier_slug);
    let fallback = || GuardOutcome::Redirect(role_default(claims));
    let slugs = match layout {
        Layout::Company => CanonicalSlugs {
            company: company.ok_or_else(fallback)?.to_string(),
            branch: None,
            cashier: None,
        },
        Layout::Branch => CanonicalSlugs {
            company: company.ok_or_else(fallback)?.to_string(),
            branch: Some(branch.ok_or_else(fallback)?.to_string()),
            cashier: None,
        },
        Layout::Cashier => CanonicalSlugs {
            company: company.ok_or_else(fallback)?.to_string(),
            branch: Some(branch.ok_or_else(fallback)?.to_string()),
            cashier: Some(cashier.ok_or_else(fallback)?.to_string()),
        },
    };
    Ok(slugs)
}

fn verify_tenant(
    layout: Layout,
    uid: &PrincipalId,
    claims: &PortalClaims,
    resolved: &ResolvedTenant,
) -> Result<(), DenyReason> {
    let company = resolved.company.as_ref().ok_or(DenyReason::TenantNotFound)?;
    let company_id = claims.company_id.as_ref().ok_or(DenyReason::MissingContext)?;
    if &company.id != company_id {
        return Err(DenyReason::TenantMismatch);
    }
    if layout == Layout::Company {
        return if &company.owner_uid == uid {
            Ok(())
        } else {
            Err(DenyReason::TenantMismatch)
        };
    }

    let branch = resolved.branch.as_ref().ok_or(DenyReason::TenantNotFound)?;
    let branch_id = claims.branch_id.as_ref().ok_or(DenyReason::MissingContext)?;
    if &branch.id != branch_id || !branch.belongs_to(company) {
        return Err(DenyReason::TenantMismatch);
    }
    if layout == Layout::Branch {
        return if branch.manager_uid.as_ref() == Some(uid) {
            Ok(())
        } else {
            Err(DenyReason::TenantMismatch)
        };
    }

    let cashier = resolved.cashier.as_ref().ok_or(DenyReason::TenantNotFound)?;
    let cashier_id = claims.cashier_id.as_ref().ok_or(DenyReason::MissingContext)?;
    if &cashier.id != cashier_id || !cashier.belongs_to(branch) || &cashier.uid != uid {
        return Err(DenyReason::TenantMismatch);
    }
    Ok(())
}

/// Permission check shared by tenant and top-level pages. A missing permission
/// sends the principal to its landing route, unless that is where it already
/// is.
fn check_permission(claims: &PortalClaims, path: &str) -> GuardOutcome {
    let Some(required) = required_permission_for_path(path) else {
        return GuardOutcome::Allow;
    };
    if claims.effective_permissions().contains(&required) {
        return GuardOutcome::Allow;
    }
    let landing = role_default(claims);
    if landing == path {
        GuardOutcome::Deny(DenyReason::MissingPermission)
    } else {
        GuardOutcome::Redirect(landing)
    }
}

/// Full tenant-page decision.
///
/// Order: role & slugs → tenant records match claims → requested slugs equal
/// canonical ones (else redirect to the canonical URL) → path permission.
pub fn evaluate(
    uid: &PrincipalId,
    claims: &PortalClaims,
    request: &TenantRequest,
    resolved: &ResolvedTenant,
) -> GuardOutcome {
    let canonical = match canonical_slugs(request.layout, claims) {
        Ok(c) => c,
        Err(outcome) => return outcome,
    };
    if let Err(reason) = verify_tenant(request.layout, uid, claims, resolved) {
        return GuardOutcome::Deny(reason);
    }

    let canonical_request = TenantRequest {
        layout: request.layout,
        company_slug: canonical.company,
        branch_slug: canonical.branch,
        cashier_slug: canonical.cashier,
        rest: request.rest.clone(),
    };
    if canonical_request != *request {
        return GuardOutcome::Redirect(canonical_request.path());
    }

    check_permission(claims, &request.path())
}

/// Decision for top-level pages (`/transactions`, `/qr-registration`, …):
/// any authenticated role, plus the path permission.
pub fn evaluate_top_level(claims: &PortalClaims, path: &str) -> GuardOutcome {
    check_permission(claims, path)
}
