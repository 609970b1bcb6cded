//! Infrastructure layer: storage adapters and the I/O-bound identity services.

pub mod audit;
pub mod auth_flow;
pub mod identity_admin;
pub mod notify;
pub mod sessions;
pub mod store;

pub use audit::{AuditRecorder, actions};
pub use auth_flow::{AuthService, LoginResult, MIN_PASSWORD_LEN, Profile};
pub use identity_admin::{CreateIdentity, IdentityAdmin};
pub use notify::{LogNotifier, NotifyError, ResetNotifier};
pub use sessions::{RESET_TOKEN_PREFIX, RESET_TOKEN_TTL, SessionService};
pub use store::{
    Identity, IdentityChanges, IdentityFilter, IdentityPage, InMemoryStore, PageRequest, PgStore, StoreError,
    StorePorts, TenantSummary,
};
