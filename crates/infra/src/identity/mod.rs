//! Identity-provider seam.
//!
//! The provider owns user accounts, signs ID tokens and session cookies, and
//! stores custom claims. The portal only talks to it through
//! [`IdentityProvider`] and [`TokenExchanger`]; [`IdentityBridge`] layers the
//! portal's cookie rules on top.

pub mod bridge;
pub mod exchange;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use qrportal_auth::{DecodedClaims, PortalClaims, UserPrincipal};
use qrportal_core::{PortalError, PrincipalId};

use crate::sessions::{PrincipalLookup, SessionError};

pub use bridge::{IdentityBridge, SessionCookie};
pub use exchange::RestTokenExchanger;
pub use local::LocalIdentityProvider;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Not an ID token, bad signature, or expired.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("user not found")]
    UserNotFound,

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

impl From<IdentityError> for PortalError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken(_) | IdentityError::InvalidSession(_) => PortalError::NotAuthorized,
            IdentityError::UserNotFound => PortalError::NotFound,
            other => PortalError::server(other.to_string()),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a client-side ID token.
    async fn verify_id_token(&self, id_token: &str) -> Result<DecodedClaims, IdentityError>;

    /// Mint a session cookie from a fresh ID token. `ttl` is already clamped.
    async fn create_session_cookie(&self, id_token: &str, ttl: Duration) -> Result<String, IdentityError>;

    async fn verify_session_cookie(&self, cookie: &str, check_revoked: bool) -> Result<DecodedClaims, IdentityError>;

    /// Short-lived token the client (or an exchanger) trades for an ID token.
    async fn create_custom_token(&self, uid: &PrincipalId) -> Result<String, IdentityError>;

    async fn get_user(&self, uid: &PrincipalId) -> Result<UserPrincipal, IdentityError>;

    /// Replace the user's custom claims wholesale.
    async fn set_custom_claims(&self, uid: &PrincipalId, claims: &PortalClaims) -> Result<(), IdentityError>;

    /// Invalidate every session cookie and refresh token issued so far.
    async fn revoke_sessions(&self, uid: &PrincipalId) -> Result<(), IdentityError>;

    /// Whether custom tokens from this provider can be traded at the hosted
    /// `signInWithCustomToken` endpoint.
    fn supports_remote_exchange(&self) -> bool {
        false
    }
}

/// Trades a custom token for an ID token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<String, IdentityError>;
}

/// Session principal for the user session store: the provider's user record.
pub struct ProviderUserLookup {
    provider: Arc<dyn IdentityProvider>,
}

impl ProviderUserLookup {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PrincipalLookup for ProviderUserLookup {
    type Principal = UserPrincipal;

    async fn lookup(&self, id: &PrincipalId) -> Result<Option<UserPrincipal>, SessionError> {
        match self.provider.get_user(id).await {
            Ok(user) => Ok(Some(user)),
            Err(IdentityError::UserNotFound) => Ok(None),
            Err(err) => Err(SessionError::Lookup(err.to_string())),
        }
    }
}
