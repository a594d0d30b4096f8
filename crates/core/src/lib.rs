//! `qrportal-core` — shared primitives for the merchant portal.
//!
//! This crate contains **pure** building blocks (no IO): identifiers, slugs,
//! tenant entities, the clock abstraction and the error taxonomy.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod slug;
pub mod tenant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{PortalError, PortalResult};
pub use id::{BranchId, CashierId, CompanyId, PrincipalId};
pub use slug::Slug;
pub use tenant::{Branch, Cashier, Company};
