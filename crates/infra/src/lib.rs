//! Infrastructure layer: document store, sessions, identity provider, config.

pub mod accounts;
pub mod claims_sync;
pub mod cleanup;
pub mod config;
pub mod identity;
pub mod invites;
pub mod mailer;
pub mod metrics;
pub mod sessions;
pub mod store;
pub mod tenants;

pub use accounts::AccountService;
pub use claims_sync::{ReconciledClaims, VerifiedUser, ensure_claims_permissions, resolve_session_claims};
pub use cleanup::{CleanupQueue, CleanupTask};
pub use config::{ConfigError, PortalConfig, SmtpConfig};
pub use identity::{
    IdentityBridge, IdentityError, IdentityProvider, LocalIdentityProvider, ProviderUserLookup, RestTokenExchanger,
    SessionCookie, TokenExchanger,
};
pub use invites::InviteService;
pub use mailer::{InviteMailer, LogMailer, MailError, SmtpMailer};
pub use metrics::{AuthMetrics, AuthMetricsSnapshot};
pub use sessions::{EntityLookup, PrincipalLookup, SessionError, SessionGrant, SessionPolicy, SessionRecord, SessionStore};
pub use store::{DocumentStore, Documents, InMemoryDocumentStore, PostgresDocumentStore, StoreError};
pub use tenants::{NewBranch, NewCashier, NewCompany, TenantDirectory};
