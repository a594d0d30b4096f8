//! Cookie names, parsing and `Set-Cookie` construction.

use std::time::Duration;

/// Provider-signed session cookie.
pub const SESSION_COOKIE: &str = "session";
/// Opaque end-user session id.
pub const TOKEN_COOKIE: &str = "token";
/// Non-HttpOnly user id hint used by the edge gate and the client.
pub const USER_ID_COOKIE: &str = "uid";
pub const ADMIN_SESSION_COOKIE: &str = "admin_session";
pub const STAFF_SESSION_COOKIE: &str = "staff_session";

/// The identity provider refuses session cookies living longer than this.
pub const MAX_SESSION_COOKIE_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// Default lifetime of every session cookie.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Clamp a requested session lifetime to the provider ceiling. Longer requests
/// are shortened, never rejected.
pub fn clamp_session_ttl(requested: Duration) -> Duration {
    requested.min(MAX_SESSION_COOKIE_TTL)
}

/// Find a cookie value in a raw `Cookie` header.
pub fn get_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name).then(|| v.trim()).filter(|v| !v.is_empty())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

/// Attributes applied to every cookie the portal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub same_site: SameSite,
    pub secure: bool,
}

impl CookiePolicy {
    /// Provider session cookie: `SameSite=None; Secure` in production so the
    /// portal works when embedded cross-site, `Lax` otherwise.
    pub fn provider_session(production: bool) -> Self {
        if production {
            Self {
                same_site: SameSite::None,
                secure: true,
            }
        } else {
            Self {
                same_site: SameSite::Lax,
                secure: false,
            }
        }
    }

    /// Admin/staff cookies are always `Lax`; `Secure` in production.
    pub fn opaque_session(production: bool) -> Self {
        Self {
            same_site: SameSite::Lax,
            secure: production,
        }
    }

    pub fn set_cookie(&self, name: &str, value: &str, max_age: Duration, http_only: bool) -> String {
        let mut out = format!("{name}={value}; Path=/; Max-Age={}", max_age.as_secs());
        if http_only {
            out.push_str("; HttpOnly");
        }
        match self.same_site {
            SameSite::Lax => out.push_str("; SameSite=Lax"),
            SameSite::None => out.push_str("; SameSite=None"),
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }

    pub fn clear_cookie(&self, name: &str, http_only: bool) -> String {
        self.set_cookie(name, "", Duration::ZERO, http_only)
    }
}
