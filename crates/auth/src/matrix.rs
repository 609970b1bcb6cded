//! Static role → permission matrix.

use std::collections::{BTreeSet, HashMap};

use crate::{Permission, Role};

static NO_PERMISSIONS: BTreeSet<Permission> = BTreeSet::new();

/// Immutable mapping from every [`Role`] to the permissions it grants.
///
/// Built once at process start and shared behind an `Arc`. There is no way to
/// register or mutate grants afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    grants: HashMap<Role, BTreeSet<Permission>>,
}

impl PermissionMatrix {
    /// The production matrix.
    pub fn standard() -> Self {
        let grants = Role::ALL
            .into_iter()
            .map(|role| (role, standard_grants(role).into_iter().collect()))
            .collect();
        Self { grants }
    }

    pub fn permissions_for(&self, role: Role) -> &BTreeSet<Permission> {
        self.grants.get(&role).unwrap_or(&NO_PERMISSIONS)
    }

    /// Lookup by wire name. Unrecognised names get the empty set (fail closed).
    pub fn permissions_for_name(&self, role: &str) -> &BTreeSet<Permission> {
        match Role::from_wire(role) {
            Some(role) => self.permissions_for(role),
            None => &NO_PERMISSIONS,
        }
    }

    pub fn grants(&self, role: Role, permission: Permission) -> bool {
        self.permissions_for(role).contains(&permission)
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

// Exhaustive on purpose: a new role does not compile until it gets a row here.
fn standard_grants(role: Role) -> Vec<Permission> {
    use Permission::*;

    match role {
        Role::SuperAdmin => Permission::ALL.to_vec(),
        Role::ClientAdmin => vec![
            ReadKnowledge,
            WriteKnowledge,
            DeleteKnowledge,
            ReadClient,
            WriteClient,
            ReadStakeholder,
            WriteStakeholder,
            DeleteStakeholder,
            ReadDeliverable,
            WriteDeliverable,
            DeleteDeliverable,
            ApproveDeliverable,
            ReadTemplate,
            WriteTemplate,
            VersionTemplate,
            ManageFireflies,
            ReadAuditLog,
        ],
        Role::ProjectManager => vec![
            ReadKnowledge,
            WriteKnowledge,
            ReadClient,
            ReadStakeholder,
            WriteStakeholder,
            ReadDeliverable,
            WriteDeliverable,
            ApproveDeliverable,
            ReadTemplate,
            WriteTemplate,
        ],
        Role::Analyst => vec![
            ReadKnowledge,
            WriteKnowledge,
            ReadClient,
            ReadStakeholder,
            ReadDeliverable,
            WriteDeliverable,
            ReadTemplate,
        ],
        Role::Viewer => vec![
            ReadKnowledge,
            ReadClient,
            ReadStakeholder,
            ReadDeliverable,
            ReadTemplate,
        ],
        Role::Guest => vec![ReadKnowledge, ReadDeliverable],
    }
}
