use std::collections::BTreeSet;
use std::sync::Arc;

use kb_core::TenantId;

use crate::{Permission, PermissionMatrix, Role};

/// Pure policy decisions over the permission matrix.
///
/// - No IO
/// - No panics
/// - No mutable state (cheap to clone, safe to share across tasks)
///
/// Role arguments are wire names as carried in session claims; anything that is
/// not a known role is granted nothing.
#[derive(Debug, Clone)]
pub struct AccessEvaluator {
    matrix: Arc<PermissionMatrix>,
}

impl AccessEvaluator {
    pub fn new(matrix: Arc<PermissionMatrix>) -> Self {
        Self { matrix }
    }

    pub fn standard() -> Self {
        Self::new(Arc::new(PermissionMatrix::standard()))
    }

    pub fn permissions_for(&self, role: &str) -> &BTreeSet<Permission> {
        self.matrix.permissions_for_name(role)
    }

    pub fn has_permission(&self, role: &str, permission: Permission) -> bool {
        self.permissions_for(role).contains(&permission)
    }

    /// Tenant-scope check.
    ///
    /// Super-admins are granted every tenant. Everyone else needs `tenant_id` in
    /// their access list; an empty list grants nothing.
    pub fn has_client_access(&self, tenant_access: &[TenantId], tenant_id: TenantId, role: &str) -> bool {
        if is_super_admin(role) {
            return true;
        }
        tenant_access.contains(&tenant_id)
    }
}

impl Default for AccessEvaluator {
    fn default() -> Self {
        Self::standard()
    }
}

fn is_super_admin(role: &str) -> bool {
    Role::from_wire(role).is_some_and(Role::is_super_admin)
}
