//! Opaque server-side sessions for admins, staff and portal users.
//!
//! One implementation, three namespaces. The cookie carries only the session
//! id (32 random bytes, hex); everything else lives in the document store.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use qrportal_auth::CredentialError;
use qrportal_auth::cookies::{DEFAULT_SESSION_TTL, clamp_session_ttl};
use qrportal_auth::credentials::random_hex;
use qrportal_core::{Clock, Entity, PortalError, PrincipalId};

use crate::cleanup::{CleanupQueue, CleanupTask};
use crate::metrics::AuthMetrics;
use crate::store::{Documents, StoreError};

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Entropy(#[from] CredentialError),

    #[error("principal lookup failed: {0}")]
    Lookup(String),
}

impl From<SessionError> for PortalError {
    fn from(err: SessionError) -> Self {
        PortalError::server(err.to_string())
    }
}

/// Per-namespace knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub name: &'static str,
    pub collection: &'static str,
    pub ttl: Duration,
    /// A new session deletes every earlier session of the same principal.
    pub single_session: bool,
}

impl SessionPolicy {
    pub const ADMIN: SessionPolicy = SessionPolicy {
        name: "admin",
        collection: "admin_sessions",
        ttl: DEFAULT_SESSION_TTL,
        single_session: true,
    };

    pub const STAFF: SessionPolicy = SessionPolicy {
        name: "staff",
        collection: "staff_sessions",
        ttl: DEFAULT_SESSION_TTL,
        single_session: false,
    };

    pub const USER: SessionPolicy = SessionPolicy {
        name: "user",
        collection: "user_sessions",
        ttl: DEFAULT_SESSION_TTL,
        single_session: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub principal_id: PrincipalId,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl SessionRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms < now_ms
    }
}

/// What `create` hands back to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub principal_id: PrincipalId,
    pub expires_at_ms: i64,
    pub max_age: Duration,
}

/// Resolves the principal a session points at.
#[async_trait]
pub trait PrincipalLookup: Send + Sync {
    type Principal: Send;

    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Self::Principal>, SessionError>;
}

/// Principal stored as an entity document (admins, staff).
pub struct EntityLookup<E> {
    documents: Documents,
    _entity: PhantomData<fn() -> E>,
}

impl<E> EntityLookup<E> {
    pub fn new(documents: Documents) -> Self {
        Self {
            documents,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E> PrincipalLookup for EntityLookup<E>
where
    E: Entity<Id = PrincipalId> + DeserializeOwned + Send + 'static,
{
    type Principal = E;

    async fn lookup(&self, id: &PrincipalId) -> Result<Option<E>, SessionError> {
        Ok(self.documents.load::<E>(id).await?)
    }
}

/// Well-formed session ids are exactly 64 lowercase hex characters.
pub fn is_session_id(raw: &str) -> bool {
    raw.len() == SESSION_ID_BYTES * 2 && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub struct SessionStore<L> {
    policy: SessionPolicy,
    documents: Documents,
    lookup: L,
    clock: Arc<dyn Clock>,
    cleanup: CleanupQueue,
    metrics: Arc<AuthMetrics>,
}

impl<L: PrincipalLookup> SessionStore<L> {
    pub fn new(
        policy: SessionPolicy,
        documents: Documents,
        lookup: L,
        clock: Arc<dyn Clock>,
        cleanup: CleanupQueue,
        metrics: Arc<AuthMetrics>,
    ) -> Self {
        Self {
            policy,
            documents,
            lookup,
            clock,
            cleanup,
            metrics,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Persist a new session. `ttl` defaults to the policy TTL and is capped
    /// at the 14-day cookie maximum.
    pub async fn create(&self, principal_id: &PrincipalId, ttl: Option<Duration>) -> Result<SessionGrant, SessionError> {
        if self.policy.single_session {
            self.supersede_existing(principal_id).await;
        }

        let max_age = clamp_session_ttl(ttl.unwrap_or(self.policy.ttl));
        let now = self.clock.now_ms();
        let expires_at_ms = now + i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX - now);
        let record = SessionRecord {
            session_id: random_hex(SESSION_ID_BYTES)?,
            principal_id: principal_id.clone(),
            created_at_ms: now,
            expires_at_ms,
        };
        self.documents
            .put(self.policy.collection, &record.session_id, &record)
            .await?;
        self.metrics.session_created();
        info!(store = self.policy.name, principal_id = %principal_id, "session created");

        Ok(SessionGrant {
            session_id: record.session_id,
            principal_id: record.principal_id,
            expires_at_ms,
            max_age,
        })
    }

    /// Best effort: a listing failure only means older sessions live until
    /// they expire.
    async fn supersede_existing(&self, principal_id: &PrincipalId) {
        match self
            .documents
            .find_by_field::<SessionRecord>(self.policy.collection, "principalId", principal_id)
            .await
        {
            Ok(existing) => {
                for (id, _) in existing {
                    self.cleanup
                        .enqueue(CleanupTask::delete(self.policy.collection, id, "superseded"));
                }
            }
            Err(err) => {
                warn!(store = self.policy.name, error = %err, "could not list prior sessions");
            }
        }
    }

    /// The live session record, or `None`. Never errors: store failures are
    /// logged and treated as "no session".
    pub async fn resolve_record(&self, session_id: &str) -> Option<SessionRecord> {
        if !is_session_id(session_id) {
            self.metrics.lookup(false);
            return None;
        }
        let record = match self
            .documents
            .get::<SessionRecord>(self.policy.collection, session_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.metrics.lookup(false);
                return None;
            }
            Err(err) => {
                warn!(store = self.policy.name, error = %err, "session lookup failed");
                self.metrics.lookup(false);
                return None;
            }
        };

        if record.is_expired(self.clock.now_ms()) {
            debug!(store = self.policy.name, "session expired");
            self.cleanup
                .enqueue(CleanupTask::delete(self.policy.collection, session_id, "expired"));
            self.metrics.lookup(false);
            return None;
        }
        self.metrics.lookup(true);
        Some(record)
    }

    /// The principal behind a live session, or `None` (fail closed).
    pub async fn resolve(&self, session_id: &str) -> Option<L::Principal> {
        let record = self.resolve_record(session_id).await?;
        match self.lookup.lookup(&record.principal_id).await {
            Ok(principal) => principal,
            Err(err) => {
                warn!(store = self.policy.name, error = %err, "principal lookup failed");
                None
            }
        }
    }

    /// Idempotent.
    pub async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        if !is_session_id(session_id) {
            return Ok(());
        }
        if self.documents.delete(self.policy.collection, session_id).await? {
            self.metrics.session_revoked();
            info!(store = self.policy.name, "session destroyed");
        }
        Ok(())
    }
}
