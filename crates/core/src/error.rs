//! Portal error taxonomy.

use thiserror::Error;

/// Result type used across the portal's policy layer.
pub type PortalResult<T> = Result<T, PortalError>;

/// User-facing error categories.
///
/// Every variant maps to a fixed HTTP status at the API boundary. Messages are
/// terse; internal detail only travels inside `Server` and is logged, never
/// rendered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// Wrong password or PIN.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Invite or reset token unknown, used, or expired.
    #[error("{0}")]
    InvalidOrExpiredToken(String),

    /// Role or tenant mismatch.
    #[error("not authorized")]
    NotAuthorized,

    /// A claim the operation depends on (company, branch, ...) is absent.
    #[error("missing context: {0}")]
    MissingContext(String),

    /// A value failed validation (e.g. malformed slug).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    /// Uniqueness or state conflict (slug taken, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected failure. The payload is for logs only.
    #[error("server error")]
    Server(String),
}

impl PortalError {
    pub fn token(msg: impl Into<String>) -> Self {
        Self::InvalidOrExpiredToken(msg.into())
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingContext(field.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn server(detail: impl Into<String>) -> Self {
        Self::Server(detail.into())
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Server(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }
}
