//! Self-contained identity provider: HS256 JWTs and an in-memory user table.
//!
//! Used in development and tests, and as the reference behaviour for the
//! trait. Token kinds are distinguished by a `typ` claim so a custom token is
//! never accepted where an ID token or session cookie is expected.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use qrportal_auth::{DecodedClaims, PortalClaims, TokenValidationError, UserPrincipal, validate_claims};
use qrportal_core::{Clock, PrincipalId};

use super::{IdentityError, IdentityProvider, TokenExchanger};

const ISSUER: &str = "qrportal-local";
const ID_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
const CUSTOM_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenKind {
    Id,
    Session,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenPayload {
    sub: String,
    iss: String,
    typ: TokenKind,
    iat: i64,
    exp: i64,
    /// Millisecond issue time, for revocation checks finer than `iat`.
    iat_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default)]
    claims: PortalClaims,
}

#[derive(Debug, Clone)]
struct StoredUser {
    principal: UserPrincipal,
    /// Tokens issued at or before this instant are revoked.
    revoked_at_ms: Option<i64>,
}

pub struct LocalIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
    users: RwLock<HashMap<PrincipalId, StoredUser>>,
}

impl LocalIdentityProvider {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a user.
    pub fn create_user(&self, uid: PrincipalId, email: Option<String>, claims: PortalClaims) -> Result<(), IdentityError> {
        let mut users = self.users.write().map_err(poisoned)?;
        users.insert(
            uid.clone(),
            StoredUser {
                principal: UserPrincipal { uid, email, claims },
                revoked_at_ms: None,
            },
        );
        Ok(())
    }

    /// What a client sign-in would produce: an ID token carrying the user's
    /// current claims.
    pub fn sign_in(&self, uid: &PrincipalId) -> Result<String, IdentityError> {
        let user = self.user(uid)?;
        self.mint(TokenKind::Id, &user.principal, ID_TOKEN_TTL)
    }

    fn user(&self, uid: &PrincipalId) -> Result<StoredUser, IdentityError> {
        let users = self.users.read().map_err(poisoned)?;
        users.get(uid).cloned().ok_or(IdentityError::UserNotFound)
    }

    fn mint(&self, kind: TokenKind, principal: &UserPrincipal, ttl: Duration) -> Result<String, IdentityError> {
        let now_ms = self.clock.now_ms();
        let iat = now_ms / 1000;
        let payload = TokenPayload {
            sub: principal.uid.to_string(),
            iss: ISSUER.to_string(),
            typ: kind,
            iat,
            exp: iat + ttl.as_secs() as i64,
            iat_ms: now_ms,
            email: principal.email.clone(),
            claims: principal.claims.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)
            .map_err(|e| IdentityError::Provider(e.to_string()))
    }

    /// Signature, issuer, kind and time window. Expiry is checked against the
    /// injected clock rather than the system time.
    fn verify_token(&self, token: &str, expected: TokenKind) -> Result<TokenPayload, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_issuer(&[ISSUER]);

        let payload = decode::<TokenPayload>(token, &self.decoding, &validation)
            .map_err(|e| e.to_string())?
            .claims;
        if payload.typ != expected {
            return Err(format!("expected {expected:?} token, got {:?}", payload.typ));
        }
        let decoded = to_decoded(&payload);
        validate_claims(&decoded, self.clock.now_ms() / 1000).map_err(|e: TokenValidationError| e.to_string())?;
        Ok(payload)
    }
}

fn poisoned<T>(_: T) -> IdentityError {
    IdentityError::Provider("user table lock poisoned".to_string())
}

fn to_decoded(payload: &TokenPayload) -> DecodedClaims {
    DecodedClaims {
        uid: PrincipalId::new(payload.sub.clone()),
        email: payload.email.clone(),
        issued_at: payload.iat,
        expires_at: payload.exp,
        claims: payload.claims.clone(),
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn verify_id_token(&self, id_token: &str) -> Result<DecodedClaims, IdentityError> {
        let payload = self.verify_token(id_token, TokenKind::Id).map_err(IdentityError::InvalidToken)?;
        Ok(to_decoded(&payload))
    }

    async fn create_session_cookie(&self, id_token: &str, ttl: Duration) -> Result<String, IdentityError> {
        let payload = self.verify_token(id_token, TokenKind::Id).map_err(IdentityError::InvalidToken)?;
        let user = self.user(&PrincipalId::new(payload.sub.clone()))?;
        if user.revoked_at_ms.is_some_and(|cutoff| payload.iat_ms <= cutoff) {
            return Err(IdentityError::InvalidToken("id token revoked".into()));
        }
        let principal = UserPrincipal {
            uid: user.principal.uid,
            email: payload.email,
            claims: payload.claims,
        };
        self.mint(TokenKind::Session, &principal, ttl)
    }

    async fn verify_session_cookie(&self, cookie: &str, check_revoked: bool) -> Result<DecodedClaims, IdentityError> {
        let payload = self
            .verify_token(cookie, TokenKind::Session)
            .map_err(IdentityError::InvalidSession)?;
        if check_revoked {
            let user = self
                .user(&PrincipalId::new(payload.sub.clone()))
                .map_err(|_| IdentityError::InvalidSession("user no longer exists".into()))?;
            if user.revoked_at_ms.is_some_and(|cutoff| payload.iat_ms <= cutoff) {
                return Err(IdentityError::InvalidSession("session revoked".into()));
            }
        }
        Ok(to_decoded(&payload))
    }

    async fn create_custom_token(&self, uid: &PrincipalId) -> Result<String, IdentityError> {
        let user = self.user(uid)?;
        let principal = UserPrincipal {
            claims: PortalClaims::default(),
            ..user.principal
        };
        self.mint(TokenKind::Custom, &principal, CUSTOM_TOKEN_TTL)
    }

    async fn get_user(&self, uid: &PrincipalId) -> Result<UserPrincipal, IdentityError> {
        Ok(self.user(uid)?.principal)
    }

    async fn set_custom_claims(&self, uid: &PrincipalId, claims: &PortalClaims) -> Result<(), IdentityError> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users.get_mut(uid).ok_or(IdentityError::UserNotFound)?;
        user.principal.claims = claims.clone();
        debug!(uid = %uid, "custom claims updated");
        Ok(())
    }

    async fn revoke_sessions(&self, uid: &PrincipalId) -> Result<(), IdentityError> {
        let now_ms = self.clock.now_ms();
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users.get_mut(uid).ok_or(IdentityError::UserNotFound)?;
        user.revoked_at_ms = Some(now_ms);
        info!(uid = %uid, "sessions revoked");
        Ok(())
    }
}

#[async_trait]
impl TokenExchanger for LocalIdentityProvider {
    /// Custom token in, ID token with the user's current claims out.
    async fn exchange_custom_token(&self, custom_token: &str) -> Result<String, IdentityError> {
        let payload = self
            .verify_token(custom_token, TokenKind::Custom)
            .map_err(IdentityError::Exchange)?;
        let user = self.user(&PrincipalId::new(payload.sub))?;
        self.mint(TokenKind::Id, &user.principal, ID_TOKEN_TTL)
    }
}
