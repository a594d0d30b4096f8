//! Tenant hierarchy: company → branch → cashier.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::{BranchId, CashierId, CompanyId, PrincipalId};
use crate::slug::Slug;

/// A merchant company. Slug is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub slug: Slug,
    pub owner_uid: PrincipalId,
    pub created_at_ms: i64,
}

/// A branch of a company. Slug is unique within the company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    pub company_id: CompanyId,
    pub name: String,
    pub slug: Slug,
    pub manager_uid: Option<PrincipalId>,
    pub created_at_ms: i64,
}

/// A cashier seat within a branch. Slug (username) is unique within the branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cashier {
    pub id: CashierId,
    pub company_id: CompanyId,
    pub branch_id: BranchId,
    pub slug: Slug,
    pub uid: PrincipalId,
    pub created_at_ms: i64,
}

impl Entity for Company {
    const COLLECTION: &'static str = "companies";
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Branch {
    const COLLECTION: &'static str = "branches";
    type Id = BranchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entity for Cashier {
    const COLLECTION: &'static str = "cashiers";
    type Id = CashierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Branch {
    pub fn belongs_to(&self, company: &Company) -> bool {
        self.company_id == company.id
    }
}

impl Cashier {
    pub fn belongs_to(&self, branch: &Branch) -> bool {
        self.branch_id == branch.id && self.company_id == branch.company_id
    }
}
