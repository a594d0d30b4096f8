//! `qrportal-auth` — pure authentication/authorization policy.
//!
//! This crate is decoupled from HTTP and storage: every function takes the
//! principal, claims and tenant records it needs as parameters.

pub mod authorize;
pub mod claims;
pub mod cookies;
pub mod credentials;
pub mod gate;
pub mod guard;
pub mod invite;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod routing;

pub use authorize::{AuthzError, authorize, authorize_branch, authorize_company};
pub use claims::{DecodedClaims, PortalClaims, TokenValidationError, validate_claims};
pub use credentials::{CredentialError, CredentialHasher};
pub use gate::{AccessGate, GateDecision};
pub use guard::{GuardOutcome, Layout, ResolvedTenant, TenantRequest};
pub use invite::{InviteError, InviteKind, InviteToken};
pub use permissions::{Permission, PermissionSet, default_permissions, with_role_defaults};
pub use principal::{AdminAccount, PinCredential, StaffAccount, UserPrincipal};
pub use roles::Role;
pub use routing::{SlugContext, default_route_for_role, required_permission_for_path};
