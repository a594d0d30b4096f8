//! Company / branch / cashier records, slug lookup and provisioning.
//!
//! Slug uniqueness is enforced with index documents written via `create`
//! (insert-if-absent): `company_slugs/{slug}`, `branch_slugs/{companyId}:{slug}`,
//! `cashier_slugs/{branchId}:{slug}`. Provisioning also assigns the new
//! member's custom claims.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use qrportal_auth::guard::CanonicalSlugs;
use qrportal_auth::permissions::{COMPANY_BRANCHES, COMPANY_CASHIERS};
use qrportal_auth::{
    PortalClaims, ResolvedTenant, Role, authorize_branch, authorize_company, with_role_defaults,
};
use qrportal_core::{
    Branch, BranchId, Cashier, CashierId, Clock, Company, CompanyId, PortalError, PortalResult, PrincipalId, Slug,
};

use crate::identity::{IdentityError, IdentityProvider};
use crate::store::{Documents, StoreError};

const COMPANY_SLUGS: &str = "company_slugs";
const BRANCH_SLUGS: &str = "branch_slugs";
const CASHIER_SLUGS: &str = "cashier_slugs";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlugIndex {
    id: String,
}

fn scoped_key(scope: &str, slug: &str) -> String {
    format!("{scope}:{slug}")
}

/// Time-ordered ids keep related records adjacent in the document table.
fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
    pub name: String,
    pub slug: String,
    pub manager_uid: PrincipalId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCashier {
    pub slug: String,
    pub uid: PrincipalId,
}

#[derive(Clone)]
pub struct TenantDirectory {
    documents: Documents,
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl TenantDirectory {
    pub fn new(documents: Documents, provider: Arc<dyn IdentityProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            documents,
            provider,
            clock,
        }
    }

    async fn indexed_id(&self, collection: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .documents
            .get::<SlugIndex>(collection, key)
            .await?
            .map(|index| index.id))
    }

    pub async fn company_by_slug(&self, slug: &str) -> Result<Option<Company>, StoreError> {
        match self.indexed_id(COMPANY_SLUGS, slug).await? {
            Some(id) => self.documents.load::<Company>(&CompanyId::new(id)).await,
            None => Ok(None),
        }
    }

    pub async fn branch_by_slug(&self, company_id: &CompanyId, slug: &str) -> Result<Option<Branch>, StoreError> {
        match self.indexed_id(BRANCH_SLUGS, &scoped_key(company_id.as_str(), slug)).await? {
            Some(id) => self.documents.load::<Branch>(&BranchId::new(id)).await,
            None => Ok(None),
        }
    }

    pub async fn cashier_by_slug(&self, branch_id: &BranchId, slug: &str) -> Result<Option<Cashier>, StoreError> {
        match self.indexed_id(CASHIER_SLUGS, &scoped_key(branch_id.as_str(), slug)).await? {
            Some(id) => self.documents.load::<Cashier>(&CashierId::new(id)).await,
            None => Ok(None),
        }
    }

    /// Look up whatever part of the hierarchy the slugs name. Missing levels
    /// stay `None`; the page guard decides what that means.
    pub async fn resolve(&self, slugs: &CanonicalSlugs) -> Result<ResolvedTenant, StoreError> {
        let mut resolved = ResolvedTenant::default();
        let Some(company) = self.company_by_slug(&slugs.company).await? else {
            return Ok(resolved);
        };
        if let Some(branch_slug) = &slugs.branch {
            if let Some(branch) = self.branch_by_slug(&company.id, branch_slug).await? {
                if let Some(cashier_slug) = &slugs.cashier {
                    resolved.cashier = self.cashier_by_slug(&branch.id, cashier_slug).await?;
                }
                resolved.branch = Some(branch);
            }
        }
        resolved.company = Some(company);
        Ok(resolved)
    }

    async fn current_claims(&self, uid: &PrincipalId) -> PortalResult<PortalClaims> {
        match self.provider.get_user(uid).await {
            Ok(user) => Ok(user.claims),
            Err(IdentityError::UserNotFound) => Err(PortalError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Only portal members without a role (or plain individuals) can be
    /// given a tenant role. Existing owners, managers and cashiers keep theirs.
    async fn assignable_claims(&self, uid: &PrincipalId) -> PortalResult<PortalClaims> {
        let claims = self.current_claims(uid).await?;
        match claims.role {
            None | Some(Role::Individual) => Ok(claims),
            Some(role) => Err(PortalError::conflict(format!("user already has role {}", role.as_str()))),
        }
    }

    async fn reserve_slug(&self, collection: &str, key: &str, id: &str) -> PortalResult<()> {
        let reserved = self
            .documents
            .create(collection, key, &SlugIndex { id: id.to_string() })
            .await?;
        if reserved {
            Ok(())
        } else {
            Err(PortalError::conflict("slug already taken"))
        }
    }

    async fn release_slug(&self, collection: &str, key: &str) {
        if let Err(err) = self.documents.delete(collection, key).await {
            warn!(collection, key, error = %err, "could not release slug reservation");
        }
    }

    async fn assign_claims(&self, uid: &PrincipalId, claims: PortalClaims) -> PortalResult<()> {
        let permissions = with_role_defaults(claims.role, &claims.permissions);
        self.provider
            .set_custom_claims(uid, &claims.with_permissions(&permissions))
            .await?;
        Ok(())
    }

    /// `owner` becomes company-owner of a new company.
    pub async fn create_company(&self, owner: &PrincipalId, input: NewCompany) -> PortalResult<Company> {
        let slug = Slug::parse(&input.slug)?;
        let name = required_name(&input.name)?;
        let claims = self.assignable_claims(owner).await?;

        let company = Company {
            id: CompanyId::new(new_id()),
            name,
            slug,
            owner_uid: owner.clone(),
            created_at_ms: self.clock.now_ms(),
        };
        self.reserve_slug(COMPANY_SLUGS, company.slug.as_str(), company.id.as_str())
            .await?;
        if let Err(err) = self.documents.save(&company).await {
            self.release_slug(COMPANY_SLUGS, company.slug.as_str()).await;
            return Err(err.into());
        }

        self.assign_claims(
            owner,
            PortalClaims {
                role: Some(Role::CompanyOwner),
                account_type: Some("company".into()),
                company_id: Some(company.id.clone()),
                company_slug: Some(company.slug.to_string()),
                branch_id: None,
                branch_slug: None,
                cashier_id: None,
                cashier_slug: None,
                ..claims
            },
        )
        .await?;
        info!(company_id = %company.id, slug = %company.slug, "company created");
        Ok(company)
    }

    /// New branch of the owner's company; `managerUid` becomes its
    /// branch-manager.
    pub async fn create_branch(&self, actor: &PrincipalId, company_slug: &str, input: NewBranch) -> PortalResult<Branch> {
        let company = self.company_by_slug(company_slug).await?.ok_or(PortalError::NotFound)?;
        let actor_claims = self.current_claims(actor).await?;
        authorize_company(&actor_claims, &company.id, &COMPANY_BRANCHES)?;
        if &company.owner_uid != actor {
            return Err(PortalError::NotAuthorized);
        }

        let slug = Slug::parse(&input.slug)?;
        let name = required_name(&input.name)?;
        let manager_claims = self.assignable_claims(&input.manager_uid).await?;

        let branch = Branch {
            id: BranchId::new(new_id()),
            company_id: company.id.clone(),
            name,
            slug,
            manager_uid: Some(input.manager_uid.clone()),
            created_at_ms: self.clock.now_ms(),
        };
        let key = scoped_key(company.id.as_str(), branch.slug.as_str());
        self.reserve_slug(BRANCH_SLUGS, &key, branch.id.as_str()).await?;
        if let Err(err) = self.documents.save(&branch).await {
            self.release_slug(BRANCH_SLUGS, &key).await;
            return Err(err.into());
        }

        self.assign_claims(
            &input.manager_uid,
            PortalClaims {
                role: Some(Role::BranchManager),
                account_type: Some("branch".into()),
                company_id: Some(company.id.clone()),
                company_slug: Some(company.slug.to_string()),
                branch_id: Some(branch.id.clone()),
                branch_slug: Some(branch.slug.to_string()),
                cashier_id: None,
                cashier_slug: None,
                ..manager_claims
            },
        )
        .await?;
        info!(company_id = %company.id, branch_id = %branch.id, slug = %branch.slug, "branch created");
        Ok(branch)
    }

    /// New cashier seat in a branch, by the company owner or that branch's
    /// manager.
    pub async fn create_cashier(
        &self,
        actor: &PrincipalId,
        company_slug: &str,
        branch_slug: &str,
        input: NewCashier,
    ) -> PortalResult<Cashier> {
        let company = self.company_by_slug(company_slug).await?.ok_or(PortalError::NotFound)?;
        let branch = self
            .branch_by_slug(&company.id, branch_slug)
            .await?
            .ok_or(PortalError::NotFound)?;
        let actor_claims = self.current_claims(actor).await?;
        authorize_branch(&actor_claims, &company.id, &branch.id, &COMPANY_CASHIERS)?;

        let slug = Slug::parse(&input.slug)?;
        let cashier_claims = self.assignable_claims(&input.uid).await?;

        let cashier = Cashier {
            id: CashierId::new(new_id()),
            company_id: company.id.clone(),
            branch_id: branch.id.clone(),
            slug,
            uid: input.uid.clone(),
            created_at_ms: self.clock.now_ms(),
        };
        let key = scoped_key(branch.id.as_str(), cashier.slug.as_str());
        self.reserve_slug(CASHIER_SLUGS, &key, cashier.id.as_str()).await?;
        if let Err(err) = self.documents.save(&cashier).await {
            self.release_slug(CASHIER_SLUGS, &key).await;
            return Err(err.into());
        }

        self.assign_claims(
            &input.uid,
            PortalClaims {
                role: Some(Role::Cashier),
                account_type: Some("cashier".into()),
                company_id: Some(company.id.clone()),
                company_slug: Some(company.slug.to_string()),
                branch_id: Some(branch.id.clone()),
                branch_slug: Some(branch.slug.to_string()),
                cashier_id: Some(cashier.id.clone()),
                cashier_slug: Some(cashier.slug.to_string()),
                ..cashier_claims
            },
        )
        .await?;
        info!(branch_id = %branch.id, cashier_id = %cashier.id, slug = %cashier.slug, "cashier created");
        Ok(cashier)
    }
}

fn required_name(raw: &str) -> PortalResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PortalError::validation("name is required"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrportal_auth::guard::CanonicalSlugs;
    use qrportal_core::ManualClock;

    use crate::identity::LocalIdentityProvider;

    struct Fixture {
        provider: Arc<LocalIdentityProvider>,
        directory: TenantDirectory,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let provider = Arc::new(LocalIdentityProvider::new(b"s", clock.clone()));
        for uid in ["owner", "manager", "cashier", "stranger"] {
            provider
                .create_user(
                    PrincipalId::new(uid),
                    None,
                    PortalClaims {
                        role: Some(Role::Individual),
                        ..PortalClaims::default()
                    },
                )
                .unwrap();
        }
        let directory = TenantDirectory::new(Documents::in_memory(), provider.clone(), clock);
        Fixture { provider, directory }
    }

    async fn claims_of(f: &Fixture, uid: &str) -> PortalClaims {
        f.provider.get_user(&PrincipalId::new(uid)).await.unwrap().claims
    }

    async fn provision(f: &Fixture) -> (Company, Branch, Cashier) {
        let owner = PrincipalId::new("owner");
        let company = f
            .directory
            .create_company(&owner, NewCompany { name: "Acme".into(), slug: "acme".into() })
            .await
            .unwrap();
        let branch = f
            .directory
            .create_branch(
                &owner,
                "acme",
                NewBranch {
                    name: "Colombo".into(),
                    slug: "colombo".into(),
                    manager_uid: PrincipalId::new("manager"),
                },
            )
            .await
            .unwrap();
        let cashier = f
            .directory
            .create_cashier(
                &PrincipalId::new("manager"),
                "acme",
                "colombo",
                NewCashier {
                    slug: "cashier1".into(),
                    uid: PrincipalId::new("cashier"),
                },
            )
            .await
            .unwrap();
        (company, branch, cashier)
    }

    #[tokio::test]
    async fn provisioning_assigns_claims_down_the_hierarchy() {
        let f = fixture();
        let (company, branch, cashier) = provision(&f).await;

        let owner = claims_of(&f, "owner").await;
        assert_eq!(owner.role, Some(Role::CompanyOwner));
        assert_eq!(owner.company_id, Some(company.id.clone()));
        assert!(owner.permissions.contains(&COMPANY_BRANCHES));

        let manager = claims_of(&f, "manager").await;
        assert_eq!(manager.role, Some(Role::BranchManager));
        assert_eq!(manager.branch_slug.as_deref(), Some("colombo"));
        assert_eq!(manager.branch_id, Some(branch.id.clone()));

        let cashier_claims = claims_of(&f, "cashier").await;
        assert_eq!(cashier_claims.role, Some(Role::Cashier));
        assert_eq!(cashier_claims.cashier_id, Some(cashier.id.clone()));
        assert_eq!(cashier_claims.cashier_slug.as_deref(), Some("cashier1"));
    }

    #[tokio::test]
    async fn resolve_walks_the_hierarchy() {
        let f = fixture();
        let (company, branch, cashier) = provision(&f).await;

        let resolved = f
            .directory
            .resolve(&CanonicalSlugs {
                company: "acme".into(),
                branch: Some("colombo".into()),
                cashier: Some("cashier1".into()),
            })
            .await
            .unwrap();
        assert_eq!(resolved.company, Some(company));
        assert_eq!(resolved.branch, Some(branch));
        assert_eq!(resolved.cashier, Some(cashier));

        let missing = f
            .directory
            .resolve(&CanonicalSlugs {
                company: "acme".into(),
                branch: Some("kandy".into()),
                cashier: None,
            })
            .await
            .unwrap();
        assert!(missing.company.is_some());
        assert!(missing.branch.is_none());
    }

    #[tokio::test]
    async fn company_slugs_are_globally_unique() {
        let f = fixture();
        f.directory
            .create_company(&PrincipalId::new("owner"), NewCompany { name: "Acme".into(), slug: "acme".into() })
            .await
            .unwrap();
        let err = f
            .directory
            .create_company(&PrincipalId::new("stranger"), NewCompany { name: "Other".into(), slug: "acme".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
        assert_eq!(claims_of(&f, "stranger").await.role, Some(Role::Individual));
    }

    #[tokio::test]
    async fn existing_roles_are_not_overwritten() {
        let f = fixture();
        provision(&f).await;
        let err = f
            .directory
            .create_company(&PrincipalId::new("manager"), NewCompany { name: "Mine".into(), slug: "mine".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
        assert_eq!(claims_of(&f, "manager").await.role, Some(Role::BranchManager));
    }

    #[tokio::test]
    async fn only_the_owner_can_add_branches() {
        let f = fixture();
        provision(&f).await;
        let err = f
            .directory
            .create_branch(
                &PrincipalId::new("stranger"),
                "acme",
                NewBranch {
                    name: "Kandy".into(),
                    slug: "kandy".into(),
                    manager_uid: PrincipalId::new("stranger"),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::NotAuthorized);
    }

    #[tokio::test]
    async fn invalid_slugs_are_rejected() {
        let f = fixture();
        let err = f
            .directory
            .create_company(&PrincipalId::new("owner"), NewCompany { name: "Acme".into(), slug: "-Acme".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }
}
