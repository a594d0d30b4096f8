//! Password/PIN hashing with a server-side pepper.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("secret must not be empty")]
    EmptySecret,

    #[error("random source unavailable: {0}")]
    Entropy(String),

    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Argon2id hasher over `secret || pepper`.
///
/// The pepper never leaves the process; the stored PHC string carries the
/// salt and parameters.
#[derive(Clone)]
pub struct CredentialHasher {
    pepper: String,
}

impl core::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

impl CredentialHasher {
    pub fn new(pepper: impl Into<String>) -> Self {
        Self { pepper: pepper.into() }
    }

    fn peppered(&self, secret: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(secret.len() + self.pepper.len());
        buf.extend_from_slice(secret.as_bytes());
        buf.extend_from_slice(self.pepper.as_bytes());
        buf
    }

    pub fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| CredentialError::Entropy(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hash(e.to_string()))?;
        let phc = Argon2::default()
            .hash_password(&self.peppered(secret), &salt)
            .map_err(|e| CredentialError::Hash(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// `false` for a wrong secret and for any malformed hash; never errors.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(&self.peppered(secret), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// `bytes` random bytes from the OS, hex-encoded. Used for session ids,
/// invite secrets and document ids.
pub fn random_hex(bytes: usize) -> Result<String, CredentialError> {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf).map_err(|e| CredentialError::Entropy(e.to_string()))?;
    Ok(hex::encode(buf))
}

/// A PIN is 4 to 8 ASCII digits.
pub fn validate_pin(pin: &str) -> bool {
    (4..=8).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}
