use chrono::{DateTime, Utc};
use thiserror::Error;

use kb_core::TenantId;

use crate::{AccessEvaluator, Permission, SessionClaims, TokenCodec, TokenError};

/// How a gate rejection surfaces to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateErrorKind {
    Unauthenticated,
    Forbidden,
    BadRequest,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("missing bearer token")]
    MissingCredential,

    #[error("unauthenticated: {0}")]
    Unauthenticated(TokenError),

    #[error("missing permission: {0}")]
    MissingPermission(Permission),

    #[error("no access to client {0}")]
    TenantDenied(TenantId),

    #[error("client id is required")]
    TenantUnresolved,
}

impl GateError {
    pub fn kind(&self) -> GateErrorKind {
        match self {
            GateError::MissingCredential | GateError::Unauthenticated(_) => GateErrorKind::Unauthenticated,
            GateError::MissingPermission(_) | GateError::TenantDenied(_) => GateErrorKind::Forbidden,
            GateError::TenantUnresolved => GateErrorKind::BadRequest,
        }
    }
}

/// Per-request enforcement point: token verification plus permission and
/// tenant checks. Stateless; share one instance behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RequestGate {
    codec: TokenCodec,
    evaluator: AccessEvaluator,
}

impl RequestGate {
    pub fn new(codec: TokenCodec, evaluator: AccessEvaluator) -> Self {
        Self { codec, evaluator }
    }

    /// Verify the raw `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<SessionClaims, GateError> {
        self.authenticate_at(header, Utc::now())
    }

    pub fn authenticate_at(&self, header: Option<&str>, now: DateTime<Utc>) -> Result<SessionClaims, GateError> {
        let token = header.and_then(bearer_token).ok_or(GateError::MissingCredential)?;

        match self.codec.parse_at(token, now) {
            Ok(claims) => Ok(claims),
            Err(TokenError::Expired) => {
                tracing::info!("rejected expired session token");
                Err(GateError::Unauthenticated(TokenError::Expired))
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejected invalid session token");
                Err(GateError::Unauthenticated(err))
            }
        }
    }

    pub fn authorize(&self, claims: &SessionClaims, permission: Permission) -> Result<(), GateError> {
        if self.evaluator.has_permission(&claims.role, permission) {
            Ok(())
        } else {
            tracing::info!(user_id = %claims.identity_id, role = %claims.role, %permission, "permission denied");
            Err(GateError::MissingPermission(permission))
        }
    }

    pub fn authorize_tenant(&self, claims: &SessionClaims, tenant_id: TenantId) -> Result<(), GateError> {
        if self.evaluator.has_client_access(&claims.tenant_access, tenant_id, &claims.role) {
            Ok(())
        } else {
            tracing::info!(user_id = %claims.identity_id, client_id = %tenant_id, "client access denied");
            Err(GateError::TenantDenied(tenant_id))
        }
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use kb_core::IdentityId;

    use super::*;
    use crate::Role;

    const SECRET: &[u8] = b"gate-secret";

    fn gate() -> RequestGate {
        RequestGate::new(TokenCodec::new(SECRET), AccessEvaluator::standard())
    }

    fn bearer(claims: &SessionClaims) -> String {
        format!("Bearer {}", TokenCodec::new(SECRET).issue(claims).unwrap())
    }

    #[test]
    fn bearer_header_shapes() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn missing_or_malformed_header_is_unauthenticated() {
        let gate = gate();
        assert_eq!(gate.authenticate(None), Err(GateError::MissingCredential));
        assert_eq!(gate.authenticate(Some("Token x")), Err(GateError::MissingCredential));

        let err = gate.authenticate(Some("Bearer not-a-jwt")).unwrap_err();
        assert_eq!(err.kind(), GateErrorKind::Unauthenticated);
    }

    #[test]
    fn expired_session_keeps_its_cause() {
        let gate = gate();
        let issued = Utc::now() - Duration::hours(25);
        let claims = SessionClaims::for_identity(IdentityId::new(3), "bob", Role::Viewer, vec![], issued);
        let header = format!("Bearer {}", TokenCodec::new(SECRET).issue_at(&claims, issued).unwrap());

        assert_eq!(
            gate.authenticate(Some(&header)),
            Err(GateError::Unauthenticated(TokenError::Expired))
        );
    }

    #[test]
    fn alice_is_scoped_to_client_seven() {
        let gate = gate();
        let claims = SessionClaims::for_identity(
            IdentityId::new(11),
            "alice",
            Role::Analyst,
            vec![TenantId::new(7)],
            Utc::now(),
        );
        let header = bearer(&claims);

        let verified = gate.authenticate(Some(&header)).unwrap();
        assert_eq!(verified.role, "analyst");
        assert_eq!(verified.tenant_access, vec![TenantId::new(7)]);

        assert_eq!(gate.authorize_tenant(&verified, TenantId::new(7)), Ok(()));
        let denied = gate.authorize_tenant(&verified, TenantId::new(9)).unwrap_err();
        assert_eq!(denied, GateError::TenantDenied(TenantId::new(9)));
        assert_eq!(denied.kind(), GateErrorKind::Forbidden);

        assert_eq!(gate.authorize(&verified, Permission::WriteDeliverable), Ok(()));
        assert_eq!(
            gate.authorize(&verified, Permission::ManageUsers),
            Err(GateError::MissingPermission(Permission::ManageUsers))
        );
    }

    #[test]
    fn super_admin_passes_every_tenant_gate() {
        let gate = gate();
        let claims = SessionClaims::for_identity(IdentityId::new(1), "root", Role::SuperAdmin, vec![], Utc::now());
        for tenant in [1, 7, 9, i64::MAX] {
            assert_eq!(gate.authorize_tenant(&claims, TenantId::new(tenant)), Ok(()));
        }
    }

    #[test]
    fn unresolved_tenant_is_a_client_error() {
        assert_eq!(GateError::TenantUnresolved.kind(), GateErrorKind::BadRequest);
    }
}
