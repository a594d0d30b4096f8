//! Self-healing claims: bring a user's stored permissions up to their role
//! defaults whenever a session is verified.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use qrportal_auth::{DecodedClaims, PermissionSet, PortalClaims, Role, with_role_defaults};
use qrportal_core::PrincipalId;

use crate::identity::{IdentityBridge, IdentityError, IdentityProvider};
use crate::metrics::AuthMetrics;

/// A verified session with its effective claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub uid: PrincipalId,
    pub email: Option<String>,
    /// Session claims with `permissions` replaced by the effective set.
    pub claims: PortalClaims,
    pub permissions: PermissionSet,
}

/// Cookies already reconciled against the provider: per uid and role, the
/// newest `issued_at` checked. An older cookie of the same principal carries
/// the same stale claims, so the provider read is skipped for it.
#[derive(Clone, Default)]
pub struct ReconciledClaims {
    seen: Arc<Mutex<HashMap<(PrincipalId, Option<Role>), i64>>>,
}

impl ReconciledClaims {
    pub fn new() -> Self {
        Self::default()
    }

    fn covers(&self, decoded: &DecodedClaims) -> bool {
        let Ok(seen) = self.seen.lock() else {
            return false;
        };
        seen.get(&(decoded.uid.clone(), decoded.claims.role))
            .is_some_and(|at| decoded.issued_at <= *at)
    }

    fn record(&self, decoded: &DecodedClaims) {
        if let Ok(mut seen) = self.seen.lock() {
            let at = seen.entry((decoded.uid.clone(), decoded.claims.role)).or_insert(decoded.issued_at);
            *at = (*at).max(decoded.issued_at);
        }
    }
}

/// Merge the role defaults into the decoded permissions and, when the result
/// differs from what the token carries, write it back to the provider.
///
/// The write starts from the user's *current* claims so fields set since the
/// token was minted are kept, and unions permissions so nothing is ever
/// removed. Returns the effective set for this request.
pub async fn ensure_claims_permissions(
    provider: &dyn IdentityProvider,
    metrics: &AuthMetrics,
    reconciled: &ReconciledClaims,
    decoded: &DecodedClaims,
) -> Result<PermissionSet, IdentityError> {
    let merged = with_role_defaults(decoded.claims.role, &decoded.claims.permissions);
    if merged.matches(&decoded.claims.permissions) || reconciled.covers(decoded) {
        return Ok(merged);
    }

    let current = provider.get_user(&decoded.uid).await?.claims;
    let mut upgraded = current.effective_permissions();
    for p in merged.iter() {
        upgraded.insert(p.clone());
    }
    if !upgraded.matches(&current.permissions) {
        provider
            .set_custom_claims(&decoded.uid, &current.with_permissions(&upgraded))
            .await?;
        metrics.claims_upgraded();
        info!(uid = %decoded.uid, permissions = upgraded.len(), "claims permissions upgraded");
    }
    reconciled.record(decoded);
    Ok(merged)
}

/// Verify a provider session cookie (revocation checked) and heal its claims.
/// `None` on any verification failure. A failed claims write is logged; the
/// request still sees the merged permissions.
pub async fn resolve_session_claims(
    bridge: &IdentityBridge,
    metrics: &AuthMetrics,
    reconciled: &ReconciledClaims,
    cookie: &str,
) -> Option<VerifiedUser> {
    let decoded = bridge.verify_session_cookie(cookie, true).await.ok()?;
    let provider = bridge.provider().as_ref();
    let permissions = match ensure_claims_permissions(provider, metrics, reconciled, &decoded).await {
        Ok(p) => p,
        Err(err) => {
            warn!(uid = %decoded.uid, error = %err, "claims upgrade failed");
            with_role_defaults(decoded.claims.role, &decoded.claims.permissions)
        }
    };
    Some(VerifiedUser {
        claims: decoded.claims.with_permissions(&permissions),
        uid: decoded.uid,
        email: decoded.email,
        permissions,
    })
}
