//! Process configuration from the environment.
//!
//! Development tolerates missing secrets (insecure defaults, with a warning);
//! production refuses to start without them.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;

const DEV_PEPPER: &str = "dev-pepper";
const DEV_SIGNING_SECRET: &str = "dev-session-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub production: bool,
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub credential_pepper: String,
    pub session_signing_secret: String,
    pub identity_api_key: Option<String>,
    pub identity_exchange_url: Option<String>,
    pub database_url: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub public_base_url: String,
    pub bootstrap_admin: Option<(String, String)>,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("production", &self.production)
            .field("bind_addr", &self.bind_addr)
            .field("allowed_origins", &self.allowed_origins)
            .field("identity_exchange", &self.identity_api_key.is_some())
            .field("database", &self.database_url.is_some())
            .field("smtp", &self.smtp.as_ref().map(|s| &s.host))
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

fn is_production<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    set("APP_ENV")
        .or_else(|| set("NODE_ENV"))
        .is_some_and(|env| env.trim().eq_ignore_ascii_case("production"))
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Just the environment flag, for choosing a log format before the rest
    /// of the configuration is read.
    pub fn production_from_env() -> bool {
        is_production(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = is_production(&lookup);

        let secret = |name: &'static str, dev_default: &str| -> Result<String, ConfigError> {
            match var(name) {
                Some(value) => Ok(value),
                None if production => Err(ConfigError::Missing(name)),
                None => {
                    warn!("{name} not set; using insecure dev default");
                    Ok(dev_default.to_string())
                }
            }
        };

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let smtp = var("SMTP_HOST").map(|host| SmtpConfig {
            host,
            user: var("SMTP_USER"),
            password: var("SMTP_PASSWORD"),
            from: var("SMTP_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
        });

        let bootstrap_admin = match (var("BOOTSTRAP_ADMIN_EMAIL"), var("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            production,
            bind_addr,
            allowed_origins,
            credential_pepper: secret("CREDENTIAL_PEPPER", DEV_PEPPER)?,
            session_signing_secret: secret("SESSION_SIGNING_SECRET", DEV_SIGNING_SECRET)?,
            identity_api_key: var("IDENTITY_API_KEY"),
            identity_exchange_url: var("IDENTITY_EXCHANGE_URL"),
            database_url: var("DATABASE_URL"),
            smtp,
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            bootstrap_admin,
        })
    }

    /// Development defaults, for tests and local runs.
    pub fn development() -> Self {
        Self {
            production: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            allowed_origins: Vec::new(),
            credential_pepper: DEV_PEPPER.to_string(),
            session_signing_secret: DEV_SIGNING_SECRET.to_string(),
            identity_api_key: None,
            identity_exchange_url: None,
            database_url: None,
            smtp: None,
            public_base_url: "http://localhost:8080".to_string(),
            bootstrap_admin: None,
        }
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim().trim_end_matches('/');
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<PortalConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        PortalConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn development_falls_back_to_defaults() {
        let cfg = config(&[]).unwrap();
        assert!(!cfg.production);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.credential_pepper, DEV_PEPPER);
        assert!(cfg.database_url.is_none());
        assert!(cfg.smtp.is_none());
    }

    #[test]
    fn production_requires_secrets() {
        assert_eq!(
            config(&[("APP_ENV", "production")]).unwrap_err(),
            ConfigError::Missing("CREDENTIAL_PEPPER")
        );
        let cfg = config(&[
            ("NODE_ENV", "production"),
            ("CREDENTIAL_PEPPER", "p"),
            ("SESSION_SIGNING_SECRET", "s"),
        ])
        .unwrap();
        assert!(cfg.production);
    }

    #[test]
    fn origins_are_normalized() {
        let cfg = config(&[("ALLOWED_ORIGINS", "https://a.example/, https://b.example ,")]).unwrap();
        assert_eq!(cfg.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert!(cfg.is_origin_allowed("https://a.example"));
        assert!(cfg.is_origin_allowed("https://b.example/"));
        assert!(!cfg.is_origin_allowed("https://evil.example"));
    }

    #[test]
    fn bad_bind_addr_is_reported() {
        assert!(matches!(
            config(&[("BIND_ADDR", "nope")]),
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", "  "), ("SMTP_HOST", "smtp.example"), ("SMTP_FROM", "x@y")]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.smtp.unwrap().from, "x@y");
    }
}
