use kb_auth::SessionClaims;
use kb_core::{IdentityId, TenantId};

/// Tenant context for a tenant-gated request.
///
/// Only inserted after the caller's access to the tenant has been checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated caller (verified session claims).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    claims: SessionClaims,
}

impl CallerContext {
    pub fn new(claims: SessionClaims) -> Self {
        Self { claims }
    }

    pub fn identity_id(&self) -> IdentityId {
        self.claims.identity_id
    }

    pub fn role(&self) -> &str {
        &self.claims.role
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}
