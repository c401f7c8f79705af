//! Security identities (users, service accounts, agents)

use crate::role::RoleId;
use serde::{Deserialize, Serialize};

/// Principal that holds roles
///
/// The engine only needs the identity's id and type; everything else
/// belongs to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIdentity {
    /// Identity identifier (e.g., "user:alice@example.com")
    pub id: String,

    /// Identity type, must match the type bound at engine setup
    #[serde(rename = "type")]
    pub identity_type: String,

    /// Ids of the roles currently held
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl SecurityIdentity {
    /// Create an identity without roles
    pub fn new(identity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identity_type: identity_type.into(),
            roles: Vec::new(),
        }
    }

    /// Attach a role
    pub fn add_role(&mut self, role: RoleId) {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }

    /// Detach a role
    pub fn remove_role(&mut self, role: RoleId) {
        self.roles.retain(|held| *held != role);
    }

    /// Whether the identity holds the role
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_membership() {
        let mut alice = SecurityIdentity::new("user", "alice");
        alice.add_role(1);
        alice.add_role(1);
        alice.add_role(2);
        assert_eq!(alice.roles, vec![1, 2]);

        alice.remove_role(1);
        assert!(!alice.has_role(1));
        assert!(alice.has_role(2));
    }
}
