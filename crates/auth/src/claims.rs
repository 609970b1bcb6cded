use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use kb_core::{IdentityId, TenantId};

use crate::{Role, TokenError};

/// Fixed session lifetime. Not configurable per token.
pub const SESSION_TTL: Duration = Duration::hours(24);

/// Tolerated forward clock skew between the issuing and the verifying host.
pub const MAX_CLOCK_SKEW: Duration = Duration::seconds(60);

/// Identity claims carried by a session token.
///
/// Self-contained: role and tenant scope are trusted from the (verified) token
/// without a storage lookup. On the wire the timestamps are whole seconds since
/// the epoch (`iat`/`exp`), so they are truncated to seconds on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "user_id")]
    pub identity_id: IdentityId,

    pub username: String,

    /// Role wire name. Kept as text so an unknown role fails closed at the
    /// evaluator instead of failing token decoding.
    pub role: String,

    #[serde(rename = "client_access", default)]
    pub tenant_access: Vec<TenantId>,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Claims for a fresh session starting at `now`.
    pub fn for_identity(
        identity_id: IdentityId,
        username: impl Into<String>,
        role: Role,
        tenant_access: Vec<TenantId>,
        now: DateTime<Utc>,
    ) -> Self {
        let issued_at = now.trunc_subsecs(0);
        Self {
            identity_id,
            username: username.into(),
            role: role.as_str().to_string(),
            tenant_access,
            issued_at,
            expires_at: issued_at + SESSION_TTL,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

/// Time-window validation of decoded claims.
///
/// Signature checks happen in the codec; this only answers "is this token live
/// at `now`?". An expired token is always `Expired`, never `Invalid`.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::invalid("expires_at <= issued_at"));
    }
    if claims.issued_at > now + MAX_CLOCK_SKEW {
        return Err(TokenError::invalid("issued_at is in the future"));
    }
    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}
