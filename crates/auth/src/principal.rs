use serde::{Deserialize, Serialize};

use qrportal_core::{CompanyId, Entity, PrincipalId};

use crate::PortalClaims;

/// Portal administrator. Sign-in by email + password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccount {
    pub id: PrincipalId,
    pub email: String,
    pub display_name: String,
    /// Absent until the admin redeems an invite.
    #[serde(default)]
    pub password_hash: Option<String>,
    pub created_at_ms: i64,
}

/// Back-office staff member. Sign-in by username + password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffAccount {
    pub id: PrincipalId,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    pub created_at_ms: i64,
}

/// PIN a branch manager uses to confirm sensitive till operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinCredential {
    pub principal_id: PrincipalId,
    pub pin_hash: String,
    pub updated_at_ms: i64,
}

/// End user known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrincipal {
    pub uid: PrincipalId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub claims: PortalClaims,
}

impl Entity for AdminAccount {
    const COLLECTION: &'static str = "admins";
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for StaffAccount {
    const COLLECTION: &'static str = "staff";
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for PinCredential {
    const COLLECTION: &'static str = "pins";
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.principal_id
    }
}

impl AdminAccount {
    /// Client-facing view; never includes the password hash.
    pub fn profile(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "email": self.email,
            "displayName": self.display_name,
        })
    }
}

impl StaffAccount {
    pub fn profile(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "username": self.username,
            "displayName": self.display_name,
            "companyId": self.company_id,
        })
    }
}
