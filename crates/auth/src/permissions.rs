use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Atomic capability checked by the request gate.
///
/// Permissions are only ever looked up, never combined or derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadKnowledge,
    WriteKnowledge,
    DeleteKnowledge,

    ReadClient,
    WriteClient,
    DeleteClient,

    ReadStakeholder,
    WriteStakeholder,
    DeleteStakeholder,

    ReadDeliverable,
    WriteDeliverable,
    DeleteDeliverable,
    ApproveDeliverable,

    ReadTemplate,
    WriteTemplate,
    DeleteTemplate,
    VersionTemplate,

    ManageUsers,
    ManageRoles,
    SystemAdmin,
    ReadAuditLog,

    ManageFireflies,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

impl Permission {
    /// The full permission universe, in declaration order.
    pub const ALL: [Permission; 22] = [
        Permission::ReadKnowledge,
        Permission::WriteKnowledge,
        Permission::DeleteKnowledge,
        Permission::ReadClient,
        Permission::WriteClient,
        Permission::DeleteClient,
        Permission::ReadStakeholder,
        Permission::WriteStakeholder,
        Permission::DeleteStakeholder,
        Permission::ReadDeliverable,
        Permission::WriteDeliverable,
        Permission::DeleteDeliverable,
        Permission::ApproveDeliverable,
        Permission::ReadTemplate,
        Permission::WriteTemplate,
        Permission::DeleteTemplate,
        Permission::VersionTemplate,
        Permission::ManageUsers,
        Permission::ManageRoles,
        Permission::SystemAdmin,
        Permission::ReadAuditLog,
        Permission::ManageFireflies,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::ReadKnowledge => "read_knowledge",
            Permission::WriteKnowledge => "write_knowledge",
            Permission::DeleteKnowledge => "delete_knowledge",
            Permission::ReadClient => "read_client",
            Permission::WriteClient => "write_client",
            Permission::DeleteClient => "delete_client",
            Permission::ReadStakeholder => "read_stakeholder",
            Permission::WriteStakeholder => "write_stakeholder",
            Permission::DeleteStakeholder => "delete_stakeholder",
            Permission::ReadDeliverable => "read_deliverable",
            Permission::WriteDeliverable => "write_deliverable",
            Permission::DeleteDeliverable => "delete_deliverable",
            Permission::ApproveDeliverable => "approve_deliverable",
            Permission::ReadTemplate => "read_template",
            Permission::WriteTemplate => "write_template",
            Permission::DeleteTemplate => "delete_template",
            Permission::VersionTemplate => "version_template",
            Permission::ManageUsers => "manage_users",
            Permission::ManageRoles => "manage_roles",
            Permission::SystemAdmin => "system_admin",
            Permission::ReadAuditLog => "read_audit_log",
            Permission::ManageFireflies => "manage_fireflies",
        }
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique_and_parse_back() {
        let names: HashSet<&str> = Permission::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(names.len(), Permission::ALL.len());
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), p);
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Permission::ApproveDeliverable).unwrap();
        assert_eq!(json, "\"approve_deliverable\"");
    }
}
