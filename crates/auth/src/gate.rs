//! Edge access gate: cookie-presence check for protected route prefixes.
//!
//! The gate never validates cookie contents. It only keeps visitors without
//! any session cookie from reaching a protected page shell; the page guards
//! and `/api/session/verify` do the cryptographic checks.

use crate::cookies::{
    ADMIN_SESSION_COOKIE, SESSION_COOKIE, STAFF_SESSION_COOKIE, TOKEN_COOKIE, USER_ID_COOKIE,
};

/// Path prefixes the gate never looks at.
const BYPASS_PREFIXES: &[&str] = &["/api", "/_next", "/static", "/assets", "/health", "/favicon.ico"];

#[derive(Debug, Clone)]
pub struct GateRule {
    pub prefix: &'static str,
    /// Any one of these cookies lets the request through.
    pub cookies: &'static [&'static str],
    pub signin_path: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    rules: Vec<GateRule>,
}

const USER_COOKIES: &[&str] = &[USER_ID_COOKIE, TOKEN_COOKIE, SESSION_COOKIE];

impl Default for AccessGate {
    fn default() -> Self {
        let user = |prefix| GateRule {
            prefix,
            cookies: USER_COOKIES,
            signin_path: "/signin",
        };
        Self {
            rules: vec![
                user("/dashboard"),
                user("/qr-registration"),
                user("/transactions"),
                user("/summary"),
                user("/profile"),
                user("/settings"),
                GateRule {
                    prefix: "/admin",
                    cookies: &[ADMIN_SESSION_COOKIE],
                    signin_path: "/admin/signin",
                },
                GateRule {
                    prefix: "/staff",
                    cookies: &[STAFF_SESSION_COOKIE],
                    signin_path: "/staff/signin",
                },
            ],
        }
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Internals, static assets and API routes skip the gate.
pub fn is_bypassed(path: &str) -> bool {
    if BYPASS_PREFIXES.iter().any(|p| matches_prefix(path, p)) {
        return true;
    }
    path.rsplit('/').next().is_some_and(|last| last.contains('.'))
}

/// `{signin}?from={path}` with the original path percent-encoded.
pub fn signin_redirect(signin_path: &str, from: &str) -> String {
    format!("{signin_path}?from={}", urlencoding::encode(from))
}

impl AccessGate {
    pub fn new(rules: Vec<GateRule>) -> Self {
        Self { rules }
    }

    /// The protecting rule for `path`, if any. Bypassed paths have none.
    pub fn rule_for(&self, path: &str) -> Option<&GateRule> {
        if is_bypassed(path) {
            return None;
        }
        self.rules.iter().find(|r| matches_prefix(path, r.prefix))
    }

    /// Decide for `path` given a cookie-presence predicate.
    pub fn check(&self, path: &str, has_cookie: impl Fn(&str) -> bool) -> GateDecision {
        let Some(rule) = self.rule_for(path) else {
            return GateDecision::Pass;
        };
        if matches_prefix(path, rule.signin_path) {
            return GateDecision::Pass;
        }
        if rule.cookies.iter().any(|c| has_cookie(c)) {
            GateDecision::Pass
        } else {
            GateDecision::Redirect(signin_redirect(rule.signin_path, path))
        }
    }
}
