//! Portal-side rules on top of the identity provider: TTL clamping and the
//! custom-token exchange fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use qrportal_auth::DecodedClaims;
use qrportal_auth::cookies::clamp_session_ttl;
use qrportal_core::PrincipalId;

use super::{IdentityError, IdentityProvider, TokenExchanger};

/// A minted provider session cookie and the `Max-Age` to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub value: String,
    pub max_age: Duration,
}

#[derive(Clone)]
pub struct IdentityBridge {
    provider: Arc<dyn IdentityProvider>,
    exchanger: Option<Arc<dyn TokenExchanger>>,
}

impl IdentityBridge {
    pub fn new(provider: Arc<dyn IdentityProvider>, exchanger: Option<Arc<dyn TokenExchanger>>) -> Self {
        Self { provider, exchanger }
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    async fn exchange(&self, custom_token: &str) -> Result<String, IdentityError> {
        let exchanger = self
            .exchanger
            .as_ref()
            .ok_or_else(|| IdentityError::Exchange("no token exchanger configured".into()))?;
        exchanger.exchange_custom_token(custom_token).await
    }

    /// Mint a session cookie. A token the provider rejects is retried once as
    /// a custom token, exchanged for an ID token first.
    pub async fn create_session_cookie(&self, token: &str, ttl: Duration) -> Result<SessionCookie, IdentityError> {
        let max_age = clamp_session_ttl(ttl);
        let value = match self.provider.create_session_cookie(token, max_age).await {
            Ok(value) => value,
            Err(IdentityError::InvalidToken(reason)) if self.exchanger.is_some() => {
                debug!(reason = %reason, "token rejected as id token; trying custom token exchange");
                let id_token = self.exchange(token).await?;
                self.provider.create_session_cookie(&id_token, max_age).await?
            }
            Err(err) => return Err(err),
        };
        Ok(SessionCookie { value, max_age })
    }

    /// Any provider failure collapses to `InvalidSession`.
    pub async fn verify_session_cookie(&self, cookie: &str, check_revoked: bool) -> Result<DecodedClaims, IdentityError> {
        self.provider
            .verify_session_cookie(cookie, check_revoked)
            .await
            .map_err(|err| match err {
                IdentityError::InvalidSession(reason) => IdentityError::InvalidSession(reason),
                other => {
                    warn!(error = %other, "session cookie verification failed");
                    IdentityError::InvalidSession(other.to_string())
                }
            })
    }

    pub async fn create_custom_token(&self, uid: &PrincipalId) -> Result<String, IdentityError> {
        self.provider.create_custom_token(uid).await
    }

    /// Fresh session cookie for `uid` without a client round-trip: custom
    /// token → exchange → session cookie. Used by refresh so updated claims
    /// land in the cookie.
    pub async fn mint_session_for(&self, uid: &PrincipalId, ttl: Duration) -> Result<SessionCookie, IdentityError> {
        let custom = self.create_custom_token(uid).await?;
        let id_token = self.exchange(&custom).await?;
        self.create_session_cookie(&id_token, ttl).await
    }
}
