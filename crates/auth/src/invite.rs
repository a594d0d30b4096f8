//! Single-use invite tokens.
//!
//! The secret (32 random bytes, hex) travels only in the invite link; storage
//! keeps its SHA-256 so a leaked invite table cannot be replayed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use qrportal_core::{PortalError, PrincipalId};

use crate::credentials::{CredentialError, random_hex};

const TOKEN_BYTES: usize = 32;

/// What redeeming an invite sets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InviteKind {
    AdminPassword,
    StaffPassword,
    BranchPin,
}

impl InviteKind {
    /// Collection the invites of this kind live in.
    pub fn collection(self) -> &'static str {
        match self {
            InviteKind::AdminPassword => "admin_invites",
            InviteKind::StaffPassword => "staff_invites",
            InviteKind::BranchPin => "pin_invites",
        }
    }

    /// Expired admin and staff invites stay for audit; expired PIN invites are
    /// deleted when someone tries to use them.
    pub fn retain_when_expired(self) -> bool {
        !matches!(self, InviteKind::BranchPin)
    }

    pub fn sets_pin(self) -> bool {
        matches!(self, InviteKind::BranchPin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteToken {
    pub token_hash: String,
    pub email: String,
    pub principal_id: PrincipalId,
    pub kind: InviteKind,
    pub expires_at_ms: i64,
    pub used: bool,
    #[serde(default)]
    pub used_at_ms: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invalid token")]
    Unknown,

    #[error("Token already used")]
    AlreadyUsed,

    #[error("Token expired")]
    Expired,

    #[error(transparent)]
    Entropy(#[from] CredentialError),
}

impl From<InviteError> for PortalError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::Entropy(e) => PortalError::server(e.to_string()),
            other => PortalError::token(other.to_string()),
        }
    }
}

/// A freshly minted invite: the secret for the link, the record for storage.
#[derive(Debug, Clone)]
pub struct IssuedInvite {
    pub secret: String,
    pub record: InviteToken,
}

pub fn hash_token(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.trim().as_bytes()))
}

pub fn issue(
    kind: InviteKind,
    email: &str,
    principal_id: PrincipalId,
    now_ms: i64,
    ttl_ms: i64,
) -> Result<IssuedInvite, InviteError> {
    let secret = random_hex(TOKEN_BYTES)?;
    let record = InviteToken {
        token_hash: hash_token(&secret),
        email: email.trim().to_lowercase(),
        principal_id,
        kind,
        expires_at_ms: now_ms + ttl_ms,
        used: false,
        used_at_ms: None,
    };
    Ok(IssuedInvite { secret, record })
}

impl InviteToken {
    /// Whether the token can still be redeemed at `now_ms`. A used token is
    /// reported as used even after it expires.
    pub fn check(&self, now_ms: i64) -> Result<(), InviteError> {
        if self.used {
            return Err(InviteError::AlreadyUsed);
        }
        if self.expires_at_ms < now_ms {
            return Err(InviteError::Expired);
        }
        Ok(())
    }

    /// The record after redemption. Fails if the token cannot be redeemed, so
    /// `used` flips false → true at most once.
    pub fn consumed(&self, now_ms: i64) -> Result<InviteToken, InviteError> {
        self.check(now_ms)?;
        Ok(InviteToken {
            used: true,
            used_at_ms: Some(now_ms),
            ..self.clone()
        })
    }
}
