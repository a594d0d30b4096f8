//! URL slugs identifying tenant entities.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::PortalError;

const MAX_SLUG_LEN: usize = 64;

/// Human-readable URL segment identifying a company, branch or cashier.
///
/// Lowercase ASCII letters, digits and `-`, 1..=64 chars, no leading or
/// trailing dash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn parse(raw: &str) -> Result<Self, PortalError> {
        let s = raw.trim();
        if s.is_empty() || s.len() > MAX_SLUG_LEN {
            return Err(PortalError::validation("slug must be 1-64 characters"));
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(PortalError::validation("slug must not start or end with '-'"));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(PortalError::validation(
                "slug may only contain lowercase letters, digits and '-'",
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Slug {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Slug {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self {
        value.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Slug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
