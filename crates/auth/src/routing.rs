//! Role router: canonical landing routes and path → permission mapping.

use crate::Role;
use crate::permissions::{
    COMPANY_BRANCHES, COMPANY_CASHIERS, Permission, PROFILE, QR_REGISTRATION, SETTINGS, SUMMARY,
    TRANSACTIONS,
};

/// Landing route for principals without (complete) tenant context.
pub const FALLBACK_ROUTE: &str = "/qr-registration";

/// Tenant slugs taken from claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlugContext<'a> {
    pub company_slug: Option<&'a str>,
    pub branch_slug: Option<&'a str>,
    pub cashier_slug: Option<&'a str>,
}

/// Canonical landing route for a role within its tenant context.
///
/// Missing slugs never produce a partial tenant path; they fall back to
/// [`FALLBACK_ROUTE`].
pub fn default_route_for_role(role: Option<Role>, ctx: SlugContext<'_>) -> String {
    fn slug(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    match role {
        Some(Role::CompanyOwner) => match slug(ctx.company_slug) {
            Some(c) => format!("/{c}"),
            None => FALLBACK_ROUTE.to_string(),
        },
        Some(Role::BranchManager) => match (slug(ctx.company_slug), slug(ctx.branch_slug)) {
            (Some(c), Some(b)) => format!("/{c}/{b}"),
            _ => FALLBACK_ROUTE.to_string(),
        },
        Some(Role::Cashier) => match (
            slug(ctx.company_slug),
            slug(ctx.branch_slug),
            slug(ctx.cashier_slug),
        ) {
            (Some(c), Some(b), Some(k)) => format!("/{c}/{b}/{k}"),
            _ => FALLBACK_ROUTE.to_string(),
        },
        Some(Role::Individual) | None => FALLBACK_ROUTE.to_string(),
    }
}

/// Top-level routes and the permission each requires (exact or `prefix/…`).
const TOP_LEVEL_RULES: &[(&str, Permission)] = &[
    ("/qr-registration", QR_REGISTRATION),
    ("/transactions", TRANSACTIONS),
    ("/summary", SUMMARY),
    ("/dashboard", SUMMARY),
    ("/profile", PROFILE),
    ("/settings", SETTINGS),
];

/// First path segments that can never be a company slug.
pub const RESERVED_ROOT_SEGMENTS: &[&str] = &[
    "api",
    "admin",
    "staff",
    "signin",
    "signup",
    "signout",
    "invite",
    "set-password",
    "set-pin",
    "qr-registration",
    "transactions",
    "summary",
    "dashboard",
    "profile",
    "settings",
    "health",
    "_next",
    "static",
    "assets",
];

pub fn is_reserved_root(segment: &str) -> bool {
    RESERVED_ROOT_SEGMENTS.contains(&segment)
}

/// Cashier page name → permission. Unknown pages require nothing.
fn cashier_page_permission(page: Option<&str>) -> Option<Permission> {
    match page {
        None => Some(QR_REGISTRATION),
        Some("qr-registration") => Some(QR_REGISTRATION),
        Some("transactions") => Some(TRANSACTIONS),
        Some("summary") => Some(SUMMARY),
        Some("profile") => Some(PROFILE),
        Some("settings") => Some(SETTINGS),
        Some(_) => None,
    }
}

/// Split a path into its non-empty segments, ignoring any query string.
pub fn path_segments(pathname: &str) -> Vec<&str> {
    let path = pathname.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Permission a path requires, if any.
///
/// Top-level routes are an allow-list; tenant routes (`/{company}/…`) are
/// parsed more permissively because slug ownership is enforced separately by
/// the page guards. Unmatched paths require no permission.
pub fn required_permission_for_path(pathname: &str) -> Option<Permission> {
    let path = pathname.split(['?', '#']).next().unwrap_or("");
    for (prefix, permission) in TOP_LEVEL_RULES {
        if path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
        {
            return Some(permission.clone());
        }
    }

    let segments = path_segments(path);
    let first = segments.first()?;
    if is_reserved_root(first) {
        return None;
    }

    match segments.get(1).copied() {
        Some("branches") => return Some(COMPANY_BRANCHES),
        Some("profile") => return Some(PROFILE),
        Some("settings") => return Some(SETTINGS),
        _ => {}
    }

    match segments.len() {
        2 => Some(COMPANY_CASHIERS),
        n if n >= 3 => {
            let third = segments[2];
            if third.starts_with("cashier") {
                cashier_page_permission(segments.get(3).copied())
            } else if third == "profile" {
                Some(PROFILE)
            } else if third == "settings" {
                Some(SETTINGS)
            } else {
                None
            }
        }
        _ => None,
    }
}
