use serde::{Deserialize, Serialize};

/// Portal role carried in identity claims.
///
/// Roles form a tenant hierarchy: a company owner administers a company, a
/// branch manager one branch of it, and a cashier one seat in a branch.
/// Individuals are merchants without a company.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Individual,
    CompanyOwner,
    BranchManager,
    Cashier,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Individual,
        Role::CompanyOwner,
        Role::BranchManager,
        Role::Cashier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Individual => "individual",
            Role::CompanyOwner => "company-owner",
            Role::BranchManager => "branch-manager",
            Role::Cashier => "cashier",
        }
    }

    /// Lenient parse used for claims written by older clients. Unknown values
    /// are treated as "no role".
    pub fn parse(raw: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == raw.trim())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
