//! Issuing and redeeming invite tokens.
//!
//! Redemption order: look up by hash → check used/expiry (expired PIN
//! invites are deleted) → validate the new secret → hash it → load the
//! account → flip `used` with compare-and-swap → write the credential.
//! Losing the CAS means another request redeemed the token first. `used`
//! never goes back to `false`; a credential write that fails after the flip
//! leaves the invite spent and a new one has to be issued.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use qrportal_auth::credentials::{MIN_PASSWORD_LEN, validate_password, validate_pin};
use qrportal_auth::invite::{self, IssuedInvite, hash_token};
use qrportal_auth::{AdminAccount, CredentialHasher, InviteError, InviteKind, InviteToken, PinCredential, StaffAccount};
use qrportal_core::{Clock, PortalError, PortalResult, PrincipalId};

use crate::accounts::hash_blocking;
use crate::mailer::InviteMailer;
use crate::store::Documents;

pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(72 * 60 * 60);

const ALL_KINDS: &[InviteKind] = &[InviteKind::AdminPassword, InviteKind::StaffPassword, InviteKind::BranchPin];

#[derive(Clone)]
pub struct InviteService {
    documents: Documents,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
    mailer: Arc<dyn InviteMailer>,
    public_base_url: String,
    ttl: Duration,
}

impl InviteService {
    pub fn new(
        documents: Documents,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn InviteMailer>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            hasher,
            clock,
            mailer,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            ttl: DEFAULT_INVITE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn link_for(&self, kind: InviteKind, secret: &str) -> String {
        let page = if kind.sets_pin() { "set-pin" } else { "set-password" };
        format!("{}/{page}?token={secret}", self.public_base_url)
    }

    /// Mint and store an invite, then mail the link. A mail failure is
    /// logged; the invite stays valid.
    pub async fn issue(&self, kind: InviteKind, email: &str, principal_id: PrincipalId) -> PortalResult<IssuedInvite> {
        self.ensure_principal(kind, &principal_id).await?;
        let issued = invite::issue(
            kind,
            email,
            principal_id,
            self.clock.now_ms(),
            i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX / 2),
        )?;
        self.documents
            .put(kind.collection(), &issued.record.token_hash, &issued.record)
            .await?;
        info!(kind = ?kind, principal_id = %issued.record.principal_id, "invite issued");

        let link = self.link_for(kind, &issued.secret);
        if let Err(err) = self.mailer.send_invite(&issued.record.email, kind, &link).await {
            warn!(kind = ?kind, error = %err, "invite mail not delivered");
        }
        Ok(issued)
    }

    async fn ensure_principal(&self, kind: InviteKind, principal_id: &PrincipalId) -> PortalResult<()> {
        let exists = match kind {
            InviteKind::AdminPassword => self.documents.load::<AdminAccount>(principal_id).await?.is_some(),
            InviteKind::StaffPassword => self.documents.load::<StaffAccount>(principal_id).await?.is_some(),
            InviteKind::BranchPin => !principal_id.as_str().trim().is_empty(),
        };
        if exists { Ok(()) } else { Err(PortalError::NotFound) }
    }

    async fn find(&self, secret: &str) -> PortalResult<InviteToken> {
        let token_hash = hash_token(secret);
        for kind in ALL_KINDS {
            if let Some(record) = self.documents.get::<InviteToken>(kind.collection(), &token_hash).await? {
                return Ok(record);
            }
        }
        Err(InviteError::Unknown.into())
    }

    /// Find and check an invite. Expiry is judged before the kind, so an
    /// expired PIN invite is cleaned up whichever endpoint it reaches.
    async fn locate(&self, secret: &str, wants_pin: bool, now_ms: i64) -> PortalResult<InviteToken> {
        let record = self.find(secret).await?;
        self.check(&record, now_ms).await?;
        if record.kind.sets_pin() != wants_pin {
            return Err(InviteError::Unknown.into());
        }
        Ok(record)
    }

    async fn check(&self, record: &InviteToken, now_ms: i64) -> PortalResult<()> {
        if let Err(err) = record.check(now_ms) {
            if err == InviteError::Expired && !record.kind.retain_when_expired() {
                if let Err(store_err) = self.documents.delete(record.kind.collection(), &record.token_hash).await {
                    warn!(error = %store_err, "could not delete expired invite");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Flip `used`, then run `write`.
    async fn consume<F, Fut>(&self, record: InviteToken, now_ms: i64, write: F) -> PortalResult<InviteKind>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = PortalResult<()>>,
    {
        let consumed = record.consumed(now_ms)?;
        if !self
            .documents
            .compare_and_swap(record.kind.collection(), &record.token_hash, &record, &consumed)
            .await?
        {
            return Err(InviteError::AlreadyUsed.into());
        }

        if let Err(err) = write().await {
            warn!(
                kind = ?record.kind,
                principal_id = %record.principal_id,
                error = %err,
                "invite spent but credential not written"
            );
            return Err(err);
        }
        info!(kind = ?record.kind, principal_id = %record.principal_id, "invite redeemed");
        Ok(record.kind)
    }

    /// Redeem an admin or staff invite.
    pub async fn redeem_password(&self, secret: &str, password: &str) -> PortalResult<InviteKind> {
        let now_ms = self.clock.now_ms();
        let record = self.locate(secret, false, now_ms).await?;
        if !validate_password(password) {
            return Err(PortalError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash = hash_blocking(&self.hasher, password.to_string()).await?;

        let documents = self.documents.clone();
        match record.kind {
            InviteKind::AdminPassword => {
                let mut admin = documents
                    .load::<AdminAccount>(&record.principal_id)
                    .await?
                    .ok_or(PortalError::NotFound)?;
                admin.password_hash = Some(password_hash);
                self.consume(record, now_ms, || async move {
                    documents.save(&admin).await.map_err(PortalError::from)
                })
                .await
            }
            _ => {
                let mut staff = documents
                    .load::<StaffAccount>(&record.principal_id)
                    .await?
                    .ok_or(PortalError::NotFound)?;
                staff.password_hash = Some(password_hash);
                self.consume(record, now_ms, || async move {
                    documents.save(&staff).await.map_err(PortalError::from)
                })
                .await
            }
        }
    }

    /// Redeem a branch PIN invite.
    pub async fn redeem_pin(&self, secret: &str, pin: &str) -> PortalResult<InviteKind> {
        let now_ms = self.clock.now_ms();
        let record = self.locate(secret, true, now_ms).await?;
        if !validate_pin(pin) {
            return Err(PortalError::validation("PIN must be 4 to 8 digits"));
        }
        let pin_hash = hash_blocking(&self.hasher, pin.to_string()).await?;

        let documents = self.documents.clone();
        let credential = PinCredential {
            principal_id: record.principal_id.clone(),
            pin_hash,
            updated_at_ms: now_ms,
        };
        self.consume(record, now_ms, || async move {
            documents.save(&credential).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use qrportal_core::ManualClock;

    use crate::accounts::AccountService;
    use crate::mailer::MailError;
    use crate::store::{DocumentStore, InMemoryDocumentStore, StoreError};
    use qrportal_core::Entity;
    use serde_json::Value as JsonValue;

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InviteMailer for CapturingMailer {
        async fn send_invite(&self, email: &str, _kind: InviteKind, link: &str) -> Result<(), MailError> {
            self.sent.lock().unwrap().push((email.to_string(), link.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        documents: Documents,
        clock: Arc<ManualClock>,
        mailer: Arc<CapturingMailer>,
        invites: InviteService,
        accounts: AccountService,
    }

    fn fixture() -> Fixture {
        let documents = Documents::in_memory();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let hasher = CredentialHasher::new("pepper");
        let mailer = Arc::new(CapturingMailer::default());
        let invites = InviteService::new(
            documents.clone(),
            hasher.clone(),
            clock.clone(),
            mailer.clone(),
            "https://portal.example/",
        );
        let accounts = AccountService::new(documents.clone(), hasher, clock.clone());
        Fixture {
            documents,
            clock,
            mailer,
            invites,
            accounts,
        }
    }

    #[tokio::test]
    async fn admin_invite_sets_password_once() {
        let f = fixture();
        let admin = f.accounts.create_admin("ops@example.com", "Ops").await.unwrap();
        let issued = f
            .invites
            .issue(InviteKind::AdminPassword, "ops@example.com", admin.id.clone())
            .await
            .unwrap();

        let sent = f.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, format!("https://portal.example/set-password?token={}", issued.secret));

        f.invites.redeem_password(&issued.secret, "a long password").await.unwrap();
        assert!(f.accounts.verify_admin("ops@example.com", "a long password").await.is_ok());

        let again = f.invites.redeem_password(&issued.secret, "another password").await.unwrap_err();
        assert_eq!(again, PortalError::token("Token already used"));
    }

    #[tokio::test]
    async fn expired_pin_invite_is_deleted_but_admin_invite_is_kept() {
        let f = fixture();
        let admin = f.accounts.create_admin("ops@example.com", "Ops").await.unwrap();
        let admin_invite = f
            .invites
            .issue(InviteKind::AdminPassword, "ops@example.com", admin.id)
            .await
            .unwrap();
        let pin_invite = f
            .invites
            .issue(InviteKind::BranchPin, "mgr@example.com", PrincipalId::new("manager-1"))
            .await
            .unwrap();

        f.clock.advance_ms(DEFAULT_INVITE_TTL.as_millis() as i64 + 1);

        let err = f.invites.redeem_password(&admin_invite.secret, "a long password").await.unwrap_err();
        assert_eq!(err, PortalError::token("Token expired"));
        let err = f.invites.redeem_password(&pin_invite.secret, "a long password").await.unwrap_err();
        assert_eq!(err, PortalError::token("Token expired"));

        let kept: Option<InviteToken> = f
            .documents
            .get(InviteKind::AdminPassword.collection(), &admin_invite.record.token_hash)
            .await
            .unwrap();
        assert!(kept.is_some());
        let gone: Option<InviteToken> = f
            .documents
            .get(InviteKind::BranchPin.collection(), &pin_invite.record.token_hash)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn pin_invite_stores_pin_credential() {
        let f = fixture();
        let uid = PrincipalId::new("manager-1");
        let issued = f
            .invites
            .issue(InviteKind::BranchPin, "mgr@example.com", uid.clone())
            .await
            .unwrap();
        assert!(f.mailer.sent.lock().unwrap()[0].1.contains("/set-pin?token="));

        f.invites.redeem_pin(&issued.secret, "2468").await.unwrap();
        assert!(f.accounts.verify_pin(&uid, "2468").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_secret_does_not_consume_the_invite() {
        let f = fixture();
        let issued = f
            .invites
            .issue(InviteKind::BranchPin, "mgr@example.com", PrincipalId::new("manager-1"))
            .await
            .unwrap();

        let err = f.invites.redeem_pin(&issued.secret, "12ab").await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
        f.invites.redeem_pin(&issued.secret, "1234").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_tokens_and_wrong_kinds_are_invalid() {
        let f = fixture();
        let issued = f
            .invites
            .issue(InviteKind::BranchPin, "mgr@example.com", PrincipalId::new("manager-1"))
            .await
            .unwrap();

        assert_eq!(
            f.invites.redeem_password(&issued.secret, "a long password").await.unwrap_err(),
            PortalError::token("Invalid token")
        );
        assert_eq!(
            f.invites.redeem_pin("deadbeef", "1234").await.unwrap_err(),
            PortalError::token("Invalid token")
        );
    }

    #[tokio::test]
    async fn missing_account_is_rejected_before_the_invite_is_spent() {
        let f = fixture();
        let admin = f.accounts.create_admin("ops@example.com", "Ops").await.unwrap();
        let issued = f
            .invites
            .issue(InviteKind::AdminPassword, "ops@example.com", admin.id.clone())
            .await
            .unwrap();
        f.documents.delete("admins", admin.id.as_str()).await.unwrap();

        let err = f.invites.redeem_password(&issued.secret, "a long password").await.unwrap_err();
        assert_eq!(err, PortalError::NotFound);
        let stored: InviteToken = f
            .documents
            .get(InviteKind::AdminPassword.collection(), &issued.record.token_hash)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.used);
    }

    /// Delegates to memory but refuses writes into one collection.
    struct ReadOnlyCollection {
        inner: InMemoryDocumentStore,
        blocked: &'static str,
    }

    #[async_trait]
    impl DocumentStore for ReadOnlyCollection {
        async fn get(&self, c: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
            self.inner.get(c, id).await
        }
        async fn put(&self, c: &str, id: &str, body: JsonValue) -> Result<(), StoreError> {
            if c == self.blocked {
                return Err(StoreError::Backend("read only".into()));
            }
            self.inner.put(c, id, body).await
        }
        async fn create(&self, c: &str, id: &str, body: JsonValue) -> Result<bool, StoreError> {
            self.inner.create(c, id, body).await
        }
        async fn delete(&self, c: &str, id: &str) -> Result<bool, StoreError> {
            self.inner.delete(c, id).await
        }
        async fn find_by_field(&self, c: &str, f: &str, v: &JsonValue) -> Result<Vec<(String, JsonValue)>, StoreError> {
            self.inner.find_by_field(c, f, v).await
        }
        async fn compare_and_swap(
            &self,
            c: &str,
            id: &str,
            expected: &JsonValue,
            new: JsonValue,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_swap(c, id, expected, new).await
        }
    }

    #[tokio::test]
    async fn failed_credential_write_leaves_the_invite_spent() {
        let documents = Documents::new(Arc::new(ReadOnlyCollection {
            inner: InMemoryDocumentStore::new(),
            blocked: PinCredential::COLLECTION,
        }));
        let invites = InviteService::new(
            documents.clone(),
            CredentialHasher::new("pepper"),
            Arc::new(ManualClock::new(1_000_000)),
            Arc::new(CapturingMailer::default()),
            "https://portal.example",
        );
        let issued = invites
            .issue(InviteKind::BranchPin, "mgr@example.com", PrincipalId::new("manager-1"))
            .await
            .unwrap();

        let err = invites.redeem_pin(&issued.secret, "2468").await.unwrap_err();
        assert!(matches!(err, PortalError::Server(_)));
        let stored: InviteToken = documents
            .get(InviteKind::BranchPin.collection(), &issued.record.token_hash)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.used);

        let again = invites.redeem_pin(&issued.secret, "2468").await.unwrap_err();
        assert_eq!(again, PortalError::token("Token already used"));
    }

    #[tokio::test]
    async fn issuing_for_a_missing_admin_fails() {
        let f = fixture();
        let err = f
            .invites
            .issue(InviteKind::AdminPassword, "x@example.com", PrincipalId::new("nobody"))
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::NotFound);
    }
}
