//! Service wiring: every long-lived component the handlers share.
//!
//! `build_services` picks backends from configuration (Postgres when
//! `DATABASE_URL` is set, SMTP when `SMTP_HOST` is set, REST exchange when
//! `IDENTITY_API_KEY` is set and the provider's custom tokens are accepted
//! there). Tests call `AppServices::new` directly with
//! their own clock and identity provider.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use qrportal_auth::cookies::CookiePolicy;
use qrportal_auth::{AccessGate, AdminAccount, CredentialHasher, StaffAccount};
use qrportal_core::{Clock, PortalError, SystemClock};
use qrportal_infra::{
    AccountService, AuthMetrics, CleanupQueue, Documents, EntityLookup, IdentityBridge, IdentityProvider,
    InviteMailer, InviteService, LocalIdentityProvider, LogMailer, MailError, PortalConfig, PostgresDocumentStore,
    ProviderUserLookup, ReconciledClaims, RestTokenExchanger, SessionPolicy, SessionStore, SmtpMailer, StoreError, TenantDirectory,
    TokenExchanger,
};

pub struct AppServices {
    pub config: PortalConfig,
    pub clock: Arc<dyn Clock>,
    pub documents: Documents,
    pub metrics: Arc<AuthMetrics>,
    pub reconciled_claims: ReconciledClaims,
    pub cleanup: CleanupQueue,
    pub identity: IdentityBridge,
    pub admin_sessions: SessionStore<EntityLookup<AdminAccount>>,
    pub staff_sessions: SessionStore<EntityLookup<StaffAccount>>,
    pub user_sessions: SessionStore<ProviderUserLookup>,
    pub accounts: AccountService,
    pub invites: InviteService,
    pub tenants: TenantDirectory,
    pub gate: AccessGate,
    pub provider_cookies: CookiePolicy,
    pub opaque_cookies: CookiePolicy,
}

/// External collaborators `AppServices::new` is assembled from.
pub struct ServiceDeps {
    pub documents: Documents,
    pub provider: Arc<dyn IdentityProvider>,
    pub exchanger: Option<Arc<dyn TokenExchanger>>,
    pub mailer: Arc<dyn InviteMailer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("bootstrap admin: {0}")]
    Bootstrap(#[from] PortalError),
}

impl AppServices {
    /// Must run inside a tokio runtime (the cleanup worker is spawned here).
    pub fn new(config: PortalConfig, deps: ServiceDeps) -> Self {
        let ServiceDeps {
            documents,
            provider,
            exchanger,
            mailer,
            clock,
        } = deps;

        let metrics = Arc::new(AuthMetrics::new());
        let cleanup = CleanupQueue::spawn(documents.clone(), metrics.clone());
        let hasher = CredentialHasher::new(config.credential_pepper.clone());

        let admin_sessions = SessionStore::new(
            SessionPolicy::ADMIN,
            documents.clone(),
            EntityLookup::new(documents.clone()),
            clock.clone(),
            cleanup.clone(),
            metrics.clone(),
        );
        let staff_sessions = SessionStore::new(
            SessionPolicy::STAFF,
            documents.clone(),
            EntityLookup::new(documents.clone()),
            clock.clone(),
            cleanup.clone(),
            metrics.clone(),
        );
        let user_sessions = SessionStore::new(
            SessionPolicy::USER,
            documents.clone(),
            ProviderUserLookup::new(provider.clone()),
            clock.clone(),
            cleanup.clone(),
            metrics.clone(),
        );

        Self {
            accounts: AccountService::new(documents.clone(), hasher.clone(), clock.clone()),
            invites: InviteService::new(
                documents.clone(),
                hasher,
                clock.clone(),
                mailer,
                config.public_base_url.clone(),
            ),
            tenants: TenantDirectory::new(documents.clone(), provider.clone(), clock.clone()),
            identity: IdentityBridge::new(provider, exchanger),
            reconciled_claims: ReconciledClaims::new(),
            gate: AccessGate::default(),
            provider_cookies: CookiePolicy::provider_session(config.production),
            opaque_cookies: CookiePolicy::opaque_session(config.production),
            admin_sessions,
            staff_sessions,
            user_sessions,
            config,
            clock,
            documents,
            metrics,
            cleanup,
        }
    }
}

/// The REST exchanger only when the provider mints tokens it will accept;
/// otherwise the provider exchanges its own custom tokens.
pub fn select_exchanger<P>(config: &PortalConfig, provider: Arc<P>) -> Arc<dyn TokenExchanger>
where
    P: IdentityProvider + TokenExchanger + 'static,
{
    match &config.identity_api_key {
        Some(key) if provider.supports_remote_exchange() => {
            info!("using REST custom token exchange");
            Arc::new(RestTokenExchanger::new(key.clone(), config.identity_exchange_url.clone()))
        }
        Some(_) => {
            warn!("IDENTITY_API_KEY ignored; provider tokens are exchanged locally");
            provider
        }
        None => provider,
    }
}

/// Production wiring from configuration.
pub async fn build_services(config: PortalConfig) -> Result<AppServices, StartupError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let documents = match &config.database_url {
        Some(url) => {
            info!("using postgres document store");
            Documents::new(Arc::new(PostgresDocumentStore::connect(url).await?))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory document store");
            Documents::in_memory()
        }
    };

    let local = Arc::new(LocalIdentityProvider::new(
        config.session_signing_secret.as_bytes(),
        clock.clone(),
    ));
    let exchanger = select_exchanger(&config, local.clone());

    let mailer: Arc<dyn InviteMailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            warn!("SMTP_HOST not set; invite emails are log-only");
            Arc::new(LogMailer)
        }
    };

    let bootstrap = config.bootstrap_admin.clone();
    let services = AppServices::new(
        config,
        ServiceDeps {
            documents,
            provider: local,
            exchanger: Some(exchanger),
            mailer,
            clock,
        },
    );

    if let Some((email, password)) = bootstrap {
        services.accounts.bootstrap_admin(&email, &password).await?;
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrportal_auth::PortalClaims;
    use qrportal_core::{ManualClock, PrincipalId};
    use qrportal_auth::cookies::DEFAULT_SESSION_TTL;

    fn keyed_config() -> PortalConfig {
        let mut config = PortalConfig::development();
        config.identity_api_key = Some("api-key".into());
        config.identity_exchange_url = Some("http://127.0.0.1:9/exchange".into());
        config
    }

    #[tokio::test]
    async fn api_key_does_not_break_refresh_for_local_tokens() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let local = Arc::new(LocalIdentityProvider::new(b"secret", clock));
        let uid = PrincipalId::new("owner-1");
        local.create_user(uid.clone(), None, PortalClaims::default()).unwrap();

        let exchanger = select_exchanger(&keyed_config(), local.clone());
        let bridge = IdentityBridge::new(local, Some(exchanger));

        let cookie = bridge.mint_session_for(&uid, DEFAULT_SESSION_TTL).await.unwrap();
        let claims = bridge.verify_session_cookie(&cookie.value, true).await.unwrap();
        assert_eq!(claims.uid, uid);
    }

    #[tokio::test]
    async fn services_build_with_an_api_key_set() {
        let services = build_services(keyed_config()).await.unwrap();
        assert!(!services.config.production);
    }
}
