//! Admin and staff accounts, password/PIN verification.
//!
//! Argon2 is CPU-bound, so hashing and verification run on the blocking pool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use qrportal_auth::credentials::validate_password;
use qrportal_auth::{AdminAccount, CredentialHasher, PinCredential, StaffAccount};
use qrportal_core::{Clock, CompanyId, Entity, PortalError, PortalResult, PrincipalId};

use crate::store::Documents;

const ADMIN_EMAILS: &str = "admin_emails";
const STAFF_USERNAMES: &str = "staff_usernames";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UniqueIndex {
    id: PrincipalId,
}

pub(crate) async fn hash_blocking(hasher: &CredentialHasher, secret: String) -> PortalResult<String> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.hash(&secret))
        .await
        .map_err(|e| PortalError::server(e.to_string()))?
        .map_err(|e| PortalError::server(e.to_string()))
}

pub(crate) async fn verify_blocking(hasher: &CredentialHasher, secret: String, hash: String) -> bool {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
        .await
        .unwrap_or(false)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct AccountService {
    documents: Documents,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(documents: Documents, hasher: CredentialHasher, clock: Arc<dyn Clock>) -> Self {
        Self {
            documents,
            hasher,
            clock,
        }
    }

    async fn indexed<E>(&self, index: &str, key: &str) -> PortalResult<Option<E>>
    where
        E: Entity<Id = PrincipalId> + serde::de::DeserializeOwned,
    {
        match self.documents.get::<UniqueIndex>(index, key).await? {
            Some(entry) => Ok(self.documents.load::<E>(&entry.id).await?),
            None => Ok(None),
        }
    }

    pub async fn admin_by_email(&self, email: &str) -> PortalResult<Option<AdminAccount>> {
        self.indexed(ADMIN_EMAILS, &normalize_email(email)).await
    }

    pub async fn staff_by_username(&self, username: &str) -> PortalResult<Option<StaffAccount>> {
        self.indexed(STAFF_USERNAMES, &normalize_email(username)).await
    }

    pub async fn create_admin(&self, email: &str, display_name: &str) -> PortalResult<AdminAccount> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(PortalError::validation("a valid email is required"));
        }
        let admin = AdminAccount {
            id: PrincipalId::new(Uuid::now_v7().to_string()),
            display_name: display_name.trim().to_string(),
            email,
            password_hash: None,
            created_at_ms: self.clock.now_ms(),
        };
        let reserved = self
            .documents
            .create(ADMIN_EMAILS, &admin.email, &UniqueIndex { id: admin.id.clone() })
            .await?;
        if !reserved {
            return Err(PortalError::conflict("an admin with this email already exists"));
        }
        self.documents.save(&admin).await?;
        info!(admin_id = %admin.id, "admin account created");
        Ok(admin)
    }

    pub async fn create_staff(
        &self,
        username: &str,
        display_name: &str,
        company_id: Option<CompanyId>,
    ) -> PortalResult<StaffAccount> {
        let username = normalize_email(username);
        if username.is_empty() {
            return Err(PortalError::validation("username is required"));
        }
        let staff = StaffAccount {
            id: PrincipalId::new(Uuid::now_v7().to_string()),
            username,
            display_name: display_name.trim().to_string(),
            password_hash: None,
            company_id,
            created_at_ms: self.clock.now_ms(),
        };
        let reserved = self
            .documents
            .create(STAFF_USERNAMES, &staff.username, &UniqueIndex { id: staff.id.clone() })
            .await?;
        if !reserved {
            return Err(PortalError::conflict("username already taken"));
        }
        self.documents.save(&staff).await?;
        info!(staff_id = %staff.id, "staff account created");
        Ok(staff)
    }

    /// Create the admin if needed and set its password. For first start-up.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> PortalResult<AdminAccount> {
        if !validate_password(password) {
            return Err(PortalError::validation("bootstrap password is too short"));
        }
        let mut admin = match self.admin_by_email(email).await? {
            Some(existing) => existing,
            None => self.create_admin(email, "Administrator").await?,
        };
        admin.password_hash = Some(hash_blocking(&self.hasher, password.to_string()).await?);
        self.documents.save(&admin).await?;
        info!(admin_id = %admin.id, "bootstrap admin ready");
        Ok(admin)
    }

    /// Unknown account, unset password and wrong password are
    /// indistinguishable to the caller.
    pub async fn verify_admin(&self, email: &str, password: &str) -> PortalResult<AdminAccount> {
        let admin = self.admin_by_email(email).await?.ok_or(PortalError::InvalidCredentials)?;
        let hash = admin.password_hash.clone().ok_or(PortalError::InvalidCredentials)?;
        if verify_blocking(&self.hasher, password.to_string(), hash).await {
            Ok(admin)
        } else {
            warn!(admin_id = %admin.id, "admin sign-in rejected");
            Err(PortalError::InvalidCredentials)
        }
    }

    pub async fn verify_staff(&self, username: &str, password: &str) -> PortalResult<StaffAccount> {
        let staff = self
            .staff_by_username(username)
            .await?
            .ok_or(PortalError::InvalidCredentials)?;
        let hash = staff.password_hash.clone().ok_or(PortalError::InvalidCredentials)?;
        if verify_blocking(&self.hasher, password.to_string(), hash).await {
            Ok(staff)
        } else {
            warn!(staff_id = %staff.id, "staff sign-in rejected");
            Err(PortalError::InvalidCredentials)
        }
    }

    pub async fn verify_pin(&self, principal_id: &PrincipalId, pin: &str) -> PortalResult<()> {
        let credential = self
            .documents
            .load::<PinCredential>(principal_id)
            .await?
            .ok_or(PortalError::InvalidCredentials)?;
        if verify_blocking(&self.hasher, pin.to_string(), credential.pin_hash).await {
            Ok(())
        } else {
            Err(PortalError::InvalidCredentials)
        }
    }
}
