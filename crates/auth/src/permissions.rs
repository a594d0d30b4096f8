use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier.
///
/// Permissions are opaque string tags (e.g. "transactions",
/// "company:branches"). They are granted through role defaults and checked
/// against URL paths by the role router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const QR_REGISTRATION: Permission = Permission::from_static("qr-registration");
pub const TRANSACTIONS: Permission = Permission::from_static("transactions");
pub const SUMMARY: Permission = Permission::from_static("summary");
pub const PROFILE: Permission = Permission::from_static("profile");
pub const SETTINGS: Permission = Permission::from_static("settings");
pub const COMPANY_BRANCHES: Permission = Permission::from_static("company:branches");
pub const COMPANY_CASHIERS: Permission = Permission::from_static("company:cashiers");

const INDIVIDUAL_DEFAULTS: &[Permission] = &[QR_REGISTRATION, TRANSACTIONS, SUMMARY, PROFILE, SETTINGS];

const COMPANY_OWNER_DEFAULTS: &[Permission] = &[
    QR_REGISTRATION,
    TRANSACTIONS,
    SUMMARY,
    PROFILE,
    SETTINGS,
    COMPANY_BRANCHES,
    COMPANY_CASHIERS,
];

const BRANCH_MANAGER_DEFAULTS: &[Permission] = &[
    QR_REGISTRATION,
    TRANSACTIONS,
    SUMMARY,
    PROFILE,
    SETTINGS,
    COMPANY_CASHIERS,
];

const CASHIER_DEFAULTS: &[Permission] = &[QR_REGISTRATION, TRANSACTIONS, SUMMARY, PROFILE];

/// Static default permission table keyed by role.
pub fn default_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Individual => INDIVIDUAL_DEFAULTS,
        Role::CompanyOwner => COMPANY_OWNER_DEFAULTS,
        Role::BranchManager => BRANCH_MANAGER_DEFAULTS,
        Role::Cashier => CASHIER_DEFAULTS,
    }
}

/// Duplicate-free, order-insensitive set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_superset_of(&self, other: &[Permission]) -> bool {
        other.iter().all(|p| self.0.contains(p))
    }

    /// Order-insensitive comparison against a permission list as embedded in
    /// a token (which may contain duplicates).
    pub fn matches(&self, embedded: &[Permission]) -> bool {
        let other: BTreeSet<&Permission> = embedded.iter().collect();
        other.len() == self.0.len() && self.0.iter().all(|p| other.contains(p))
    }

    pub fn to_vec(&self) -> Vec<Permission> {
        self.0.iter().cloned().collect()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Union of `existing` with the default set for `role`.
///
/// Absent role leaves `existing` unchanged (deduplicated). The merge only ever
/// adds: a permission dropped from the defaults table is not retracted from
/// sets that already carry it.
pub fn with_role_defaults(role: Option<Role>, existing: &[Permission]) -> PermissionSet {
    let mut merged: PermissionSet = existing.iter().cloned().collect();
    if let Some(role) = role {
        for p in default_permissions(role) {
            merged.insert(p.clone());
        }
    }
    merged
}
