//! `kb-core` — identifiers and the error taxonomy shared by every layer.
//!
//! This crate contains no I/O and no security policy.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{IdentityId, TenantId};
