//! Roles and role definitions
//!
//! A [`Role`] is the persisted grant held by a security identity. What a role
//! actually allows is decided by the [`RoleDefinition`] registered for its
//! discriminator: on grant (and on rebuild) the definition issues one or more
//! [`Acl::allow`] calls.

use crate::acl::Acl;
use crate::error::{AclError, Result};
use crate::identity::SecurityIdentity;
use crate::resource::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Unique role identifier, assigned by the role store
pub type RoleId = i64;

/// Role held by a security identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role id, `None` until persisted
    #[serde(default)]
    pub id: Option<RoleId>,

    /// Discriminator selecting the role definition
    pub kind: String,

    /// Id of the security identity holding the role
    pub security_identity: String,

    /// Resource the role is about, if any (e.g. the document of an owner)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    /// Additional role data for custom definitions
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Role {
    /// Create an unpersisted role of the given kind for an identity
    pub fn new(kind: impl Into<String>, identity: &SecurityIdentity) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            security_identity: identity.id.clone(),
            resource: None,
            attributes: HashMap::new(),
        }
    }

    /// Scope the role to a resource
    pub fn on(mut self, resource: impl Into<Resource>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add an attribute to the role
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Id of the role, failing if it was never persisted
    pub fn require_id(&self) -> Result<RoleId> {
        self.id
            .ok_or_else(|| AclError::UnpersistedRole(self.kind.clone()))
    }
}

/// Behaviour of one kind of role
#[async_trait]
pub trait RoleDefinition: Send + Sync {
    /// Issue the authorizations implied by `role` through [`Acl::allow`]
    async fn create_authorizations(&self, role: &Role, acl: &Acl) -> Result<()>;
}

/// Role kind granting a fixed action set on a resource
///
/// The resource is the role's own resource unless the definition is pinned
/// to one with [`ResourceRoleDefinition::on_resource`] (e.g. an auditor role
/// on every report).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRoleDefinition {
    /// Granted action names
    pub actions: Vec<String>,

    /// Whether the grant cascades to sub-resources
    #[serde(default = "default_cascade")]
    pub cascade: bool,

    /// Fixed resource overriding the role's resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

fn default_cascade() -> bool {
    true
}

impl ResourceRoleDefinition {
    /// Grant `actions` on the role's resource
    pub fn new<S: Into<String>>(actions: impl IntoIterator<Item = S>, cascade: bool) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            cascade,
            resource: None,
        }
    }

    /// Pin the grant to a fixed resource
    pub fn on_resource(mut self, resource: impl Into<Resource>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

#[async_trait]
impl RoleDefinition for ResourceRoleDefinition {
    async fn create_authorizations(&self, role: &Role, acl: &Acl) -> Result<()> {
        let resource = self
            .resource
            .as_ref()
            .or(role.resource.as_ref())
            .ok_or_else(|| {
                AclError::InvalidInput(format!("Role '{}' has no resource to grant on", role.kind))
            })?;

        let actions = acl.action_schema().actions(self.actions.as_slice())?;
        acl.allow(role, actions, resource, self.cascade).await
    }
}

/// Discriminator -> definition map, populated once at startup
#[derive(Clone, Default)]
pub struct RoleRegistry {
    definitions: HashMap<String, Arc<dyn RoleDefinition>>,
}

impl RoleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the definition of a role kind
    ///
    /// # Errors
    ///
    /// [`AclError::InvalidInput`] for an empty or already registered
    /// discriminator.
    pub fn register(
        &mut self,
        discriminator: impl Into<String>,
        definition: Arc<dyn RoleDefinition>,
    ) -> Result<()> {
        let discriminator = discriminator.into();
        if discriminator.is_empty() {
            return Err(AclError::InvalidInput(
                "Role discriminator cannot be empty".to_string(),
            ));
        }
        if self.definitions.contains_key(&discriminator) {
            return Err(AclError::InvalidInput(format!(
                "Role discriminator '{}' is already registered",
                discriminator
            )));
        }
        self.definitions.insert(discriminator, definition);
        Ok(())
    }

    /// Definition registered for a discriminator
    pub fn get(&self, discriminator: &str) -> Result<Arc<dyn RoleDefinition>> {
        self.definitions.get(discriminator).cloned().ok_or_else(|| {
            AclError::MisconfiguredEngine(format!(
                "No role definition registered for discriminator '{}'",
                discriminator
            ))
        })
    }

    /// Whether a discriminator is registered
    pub fn contains(&self, discriminator: &str) -> bool {
        self.definitions.contains_key(discriminator)
    }

    /// Registered discriminators
    pub fn discriminators(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered role kinds
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no role kind is registered
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("discriminators", &self.discriminators())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_builder() {
        let alice = SecurityIdentity::new("user", "alice");
        let role = Role::new("owner", &alice)
            .on(Resource::entity("Document", "42"))
            .with_attribute("note", serde_json::json!("primary owner"));

        assert_eq!(role.security_identity, "alice");
        assert_eq!(role.resource, Some(Resource::entity("Document", "42")));
        assert!(matches!(role.require_id(), Err(AclError::UnpersistedRole(_))));
    }

    #[test]
    fn test_registry() {
        let mut registry = RoleRegistry::new();
        registry
            .register("owner", Arc::new(ResourceRoleDefinition::new(["view"], true)))
            .unwrap();

        assert!(registry.contains("owner"));
        assert!(registry.get("owner").is_ok());
        assert!(matches!(
            registry.get("auditor"),
            Err(AclError::MisconfiguredEngine(_))
        ));
        assert!(registry
            .register("owner", Arc::new(ResourceRoleDefinition::new(["edit"], true)))
            .is_err());
        assert!(registry
            .register("", Arc::new(ResourceRoleDefinition::new(["edit"], true)))
            .is_err());
        assert_eq!(registry.discriminators(), vec!["owner"]);
    }

    #[test]
    fn test_resource_role_definition_deserialize() {
        let definition: ResourceRoleDefinition =
            serde_json::from_str(r#"{"actions": ["view", "edit"]}"#).unwrap();
        assert!(definition.cascade);
        assert_eq!(definition.actions, vec!["view", "edit"]);
        assert!(definition.resource.is_none());
    }
}
