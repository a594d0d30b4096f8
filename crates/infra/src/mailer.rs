//! Invite delivery.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{info, warn};

use qrportal_auth::InviteKind;

use crate::config::SmtpConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

#[async_trait]
pub trait InviteMailer: Send + Sync {
    async fn send_invite(&self, email: &str, kind: InviteKind, link: &str) -> Result<(), MailError>;
}

/// Writes invites to the log instead of sending them. Used when no SMTP relay
/// is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl InviteMailer for LogMailer {
    async fn send_invite(&self, email: &str, kind: InviteKind, link: &str) -> Result<(), MailError> {
        info!(email, kind = ?kind, link, "invite ready (log-only delivery)");
        Ok(())
    }
}

/// Plain-text invites over an SMTP relay (STARTTLS/TLS via rustls).
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder = SmtpTransport::relay(&config.host).map_err(|e| MailError(e.to_string()))?;
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    fn compose(&self, email: &str, kind: InviteKind, link: &str) -> Result<Message, MailError> {
        let (subject, action) = match kind {
            InviteKind::AdminPassword => ("Your portal admin account", "set your admin password"),
            InviteKind::StaffPassword => ("Your portal staff account", "set your password"),
            InviteKind::BranchPin => ("Set your branch PIN", "choose your branch PIN"),
        };
        Message::builder()
            .from(self.from.parse().map_err(|e: lettre::address::AddressError| MailError(e.to_string()))?)
            .to(email.parse().map_err(|e: lettre::address::AddressError| MailError(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(format!("Use this link to {action}:\n\n{link}\n\nThe link can be used once."))
            .map_err(|e| MailError(e.to_string()))
    }
}

#[async_trait]
impl InviteMailer for SmtpMailer {
    async fn send_invite(&self, email: &str, kind: InviteKind, link: &str) -> Result<(), MailError> {
        let message = self.compose(email, kind, link)?;
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError(e.to_string()))?
            .map_err(|e| {
                warn!(error = %e, "smtp send failed");
                MailError(e.to_string())
            })?;
        info!(email, kind = ?kind, "invite mailed");
        Ok(())
    }
}
