use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role assigned to an identity. Exactly one per identity.
///
/// The set is closed: adding a role is a code change, which forces the
/// permission matrix to be extended in the same change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    ClientAdmin,
    ProjectManager,
    Analyst,
    Viewer,
    Guest,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::ClientAdmin,
        Role::ProjectManager,
        Role::Analyst,
        Role::Viewer,
        Role::Guest,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::ClientAdmin => "client_admin",
            Role::ProjectManager => "project_manager",
            Role::Analyst => "analyst",
            Role::Viewer => "viewer",
            Role::Guest => "guest",
        }
    }

    /// Super-admins bypass tenant scoping entirely.
    pub const fn is_super_admin(self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl Role {
    /// Exact wire-name lookup. Anything else, including other letter cases,
    /// is not a role.
    pub fn from_wire(s: &str) -> Option<Self> {
        Role::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// Operator input: letter case and surrounding whitespace are ignored.
    /// Never use this for claims or stored roles.
    pub fn parse_lenient(s: &str) -> Result<Self, UnknownRole> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_wire(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn wire_parse_is_exact() {
        assert!("SUPER_ADMIN".parse::<Role>().is_err());
        assert!(" super_admin ".parse::<Role>().is_err());
        assert_eq!(Role::from_wire("Super_Admin"), None);
        assert_eq!(Role::from_wire("super_admin"), Some(Role::SuperAdmin));
    }

    #[test]
    fn lenient_parse_is_for_operator_input() {
        assert_eq!(Role::parse_lenient(" PROJECT_MANAGER ").unwrap(), Role::ProjectManager);
        assert!(Role::parse_lenient("root").is_err());
    }

    #[test]
    fn unknown_role_is_an_error() {
        assert_eq!("root".parse::<Role>(), Err(UnknownRole("root".to_string())));
        assert!("".parse::<Role>().is_err());
    }
}
