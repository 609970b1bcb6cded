//! Domain error model.

use thiserror::Error;

/// Result type used across the service layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Classified failure of an identity/authorization operation.
///
/// Security outcomes (bad credentials, denied access) are ordinary variants so
/// callers branch on the kind instead of inspecting messages. The HTTP layer
/// maps each kind to exactly one status code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown email, inactive/deleted identity, or password mismatch.
    ///
    /// Carries no detail; every sub-case must look identical.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A value failed validation (malformed input, policy violation).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The referenced resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation conflicts with existing state (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authenticated, but lacking a permission or tenant grant.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Storage I/O failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Any other server-side failure (e.g. token signing).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_message_is_generic() {
        assert_eq!(DomainError::InvalidCredentials.to_string(), "invalid credentials");
    }
}
