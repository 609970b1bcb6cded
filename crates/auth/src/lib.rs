//! `kb-auth` — pure authentication/authorization core.
//!
//! Password hashing, session tokens, the role → permission matrix, and the
//! request gate. No HTTP and no storage: every input arrives as a value and
//! every failure leaves as a `Result`.

pub mod authorize;
pub mod claims;
pub mod gate;
pub mod matrix;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod tenant_ref;
pub mod token;

pub use authorize::AccessEvaluator;
pub use claims::{MAX_CLOCK_SKEW, SESSION_TTL, SessionClaims, validate_claims};
pub use gate::{GateError, GateErrorKind, RequestGate, bearer_token};
pub use matrix::PermissionMatrix;
pub use password::{CredentialHasher, PBKDF2_ITERATIONS, PasswordHash};
pub use permissions::{Permission, UnknownPermission};
pub use roles::{Role, UnknownRole};
pub use tenant_ref::{CLIENT_ID_FIELD, TenantSources, resolve_tenant_id};
pub use token::{TokenCodec, TokenError};
