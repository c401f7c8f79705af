//! Engine setup
//!
//! Everything the engine needs to know about the host application is
//! registered once on an [`AclSetup`] and frozen into the [`Acl`] by
//! [`AclSetup::build`]. Deployments that prefer a file can describe the
//! same registrations as [`AclSettings`] (JSON).

use crate::acl::Acl;
use crate::actions::ActionSchema;
use crate::cascade::{CascadeStrategy, SimpleCascadeStrategy};
use crate::error::{AclError, Result};
use crate::graph::{
    CascadingResourceGraphTraverser, ResourceGraphTraverser, ResourceGraphTraverserDispatcher,
    ResourceHierarchy,
};
use crate::resource::Resource;
use crate::role::{ResourceRoleDefinition, RoleDefinition, RoleRegistry};
use crate::store::{AuthorizationStore, InMemoryAclStore, RoleStore, DEFAULT_BULK_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Environment variable naming the settings file
pub const CONFIG_ENV_VAR: &str = "ACL_CONFIG";

/// Immutable engine configuration
#[derive(Debug, Clone)]
pub struct AclConfig {
    /// Type of the security identities holding roles
    pub security_identity_type: String,

    /// Actions an authorization can grant
    pub action_schema: ActionSchema,
}

/// Startup registrations for the engine
pub struct AclSetup {
    security_identity_type: Option<String>,
    action_schema: ActionSchema,
    bulk_batch_size: usize,
    roles: RoleRegistry,
    hierarchies: Vec<(String, Arc<dyn ResourceHierarchy>)>,
    traversers: Vec<(String, Arc<dyn ResourceGraphTraverser>)>,
    cascade_strategy: Option<Arc<dyn CascadeStrategy>>,
}

impl AclSetup {
    /// Empty setup with the default action schema
    pub fn new() -> Self {
        Self {
            security_identity_type: None,
            action_schema: ActionSchema::default(),
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            roles: RoleRegistry::new(),
            hierarchies: Vec::new(),
            traversers: Vec::new(),
            cascade_strategy: None,
        }
    }

    /// Bind the security identity type (required)
    pub fn set_security_identity_type(mut self, identity_type: impl Into<String>) -> Self {
        self.security_identity_type = Some(identity_type.into());
        self
    }

    /// Override the action schema
    pub fn set_action_schema(mut self, schema: ActionSchema) -> Self {
        self.action_schema = schema;
        self
    }

    /// Rows written per bulk insert transaction by the stores this setup
    /// creates
    ///
    /// Stores built elsewhere keep their own batch size.
    pub fn bulk_batch_size(mut self, size: usize) -> Self {
        self.bulk_batch_size = size.max(1);
        self
    }

    /// Register the definition of a role kind under its discriminator
    pub fn register_role(
        mut self,
        discriminator: impl Into<String>,
        definition: Arc<dyn RoleDefinition>,
    ) -> Result<Self> {
        self.roles.register(discriminator, definition)?;
        Ok(self)
    }

    /// Make resources of `class` cascade through `hierarchy`
    pub fn register_hierarchy(
        mut self,
        class: impl Into<String>,
        hierarchy: Arc<dyn ResourceHierarchy>,
    ) -> Self {
        self.hierarchies.push((class.into(), hierarchy));
        self
    }

    /// Traverse resources of `class` with a dedicated traverser
    pub fn register_traverser(
        mut self,
        class: impl Into<String>,
        traverser: Arc<dyn ResourceGraphTraverser>,
    ) -> Self {
        self.traversers.push((class.into(), traverser));
        self
    }

    /// Replace [`SimpleCascadeStrategy`]
    pub fn set_cascade_strategy(mut self, strategy: Arc<dyn CascadeStrategy>) -> Self {
        self.cascade_strategy = Some(strategy);
        self
    }

    /// Action schema the engine will use
    pub fn action_schema(&self) -> &ActionSchema {
        &self.action_schema
    }

    /// In-memory store matching this setup's schema and batch size
    pub fn in_memory_store(&self) -> InMemoryAclStore {
        InMemoryAclStore::with_batch_size(self.action_schema.clone(), self.bulk_batch_size)
    }

    /// PostgreSQL store matching this setup's schema and batch size
    #[cfg(feature = "postgres")]
    pub async fn postgres_store(&self, database_url: &str) -> Result<crate::store::PostgresAclStore> {
        Ok(
            crate::store::PostgresAclStore::new(database_url, self.action_schema.clone())
                .await?
                .with_bulk_batch_size(self.bulk_batch_size),
        )
    }

    /// Traverser assembled from the registered hierarchies and traversers
    pub fn traverser(&self) -> ResourceGraphTraverserDispatcher {
        let mut cascading = CascadingResourceGraphTraverser::new();
        for (class, hierarchy) in &self.hierarchies {
            cascading.register_hierarchy(class.clone(), hierarchy.clone());
        }

        let mut dispatcher = ResourceGraphTraverserDispatcher::new(Arc::new(cascading));
        for (class, traverser) in &self.traversers {
            dispatcher.register(class.clone(), traverser.clone());
        }
        dispatcher
    }

    /// Freeze the registrations into an engine
    ///
    /// # Errors
    ///
    /// [`AclError::MisconfiguredEngine`] if no security identity type was set.
    pub fn build(
        self,
        authorizations: Arc<dyn AuthorizationStore>,
        roles: Arc<dyn RoleStore>,
    ) -> Result<Acl> {
        let security_identity_type = self.security_identity_type.clone().ok_or_else(|| {
            AclError::MisconfiguredEngine("The security identity type must be configured".to_string())
        })?;

        let traverser: Arc<dyn ResourceGraphTraverser> = Arc::new(self.traverser());
        let strategy = match self.cascade_strategy {
            Some(strategy) => strategy,
            None => Arc::new(SimpleCascadeStrategy::new(traverser, authorizations.clone())),
        };

        info!(
            "ACL engine configured: identity type {}, {} actions, {} role kinds, {} cascading classes",
            security_identity_type,
            self.action_schema.len(),
            self.roles.len(),
            self.hierarchies.len()
        );

        let config = AclConfig {
            security_identity_type,
            action_schema: self.action_schema,
        };

        Ok(Acl::new(config, self.roles, authorizations, roles, strategy))
    }
}

impl Default for AclSetup {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative role kind granting a fixed action set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSettings {
    /// Discriminator stored with the role
    pub discriminator: String,

    /// Granted action names
    pub actions: Vec<String>,

    /// Whether the grant cascades to sub-resources
    #[serde(default = "default_cascade")]
    pub cascade: bool,

    /// Fixed resource, otherwise the role's own resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

fn default_cascade() -> bool {
    true
}

fn default_bulk_batch_size() -> usize {
    DEFAULT_BULK_BATCH_SIZE
}

/// File-based engine settings
///
/// ```json
/// {
///   "security_identity_type": "user",
///   "actions": ["view", "edit", "delete"],
///   "bulk_batch_size": 1000,
///   "roles": [
///     { "discriminator": "owner", "actions": ["view", "edit", "delete"] },
///     { "discriminator": "auditor", "actions": ["view"], "cascade": false,
///       "resource": { "kind": "class", "class": "Report" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSettings {
    /// Type of the security identities holding roles
    pub security_identity_type: String,

    /// Action schema override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,

    /// Rows written per bulk insert transaction
    #[serde(default = "default_bulk_batch_size")]
    pub bulk_batch_size: usize,

    /// Declarative role kinds
    #[serde(default)]
    pub roles: Vec<RoleSettings>,
}

impl AclSettings {
    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Load settings from the file named by `ACL_CONFIG`
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR).map_err(|_| {
            AclError::MisconfiguredEngine(format!("{} is not set", CONFIG_ENV_VAR))
        })?;
        Self::from_file(path)
    }

    /// Setup holding these settings
    ///
    /// Hierarchies and custom traversers are code, so they are registered on
    /// the returned setup.
    pub fn into_setup(self) -> Result<AclSetup> {
        let schema = match self.actions {
            Some(actions) => ActionSchema::new(actions)?,
            None => ActionSchema::default(),
        };

        let mut setup = AclSetup::new()
            .set_security_identity_type(self.security_identity_type)
            .set_action_schema(schema)
            .bulk_batch_size(self.bulk_batch_size);

        for role in self.roles {
            // Fail on unknown actions now rather than at the first grant
            setup.action_schema().actions(role.actions.as_slice())?;

            let mut definition = ResourceRoleDefinition::new(role.actions, role.cascade);
            if let Some(resource) = role.resource {
                definition = definition.on_resource(resource);
            }
            setup = setup.register_role(role.discriminator, Arc::new(definition))?;
        }

        Ok(setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SETTINGS: &str = r#"{
        "security_identity_type": "user",
        "actions": ["read", "write", "delete"],
        "bulk_batch_size": 50,
        "roles": [
            { "discriminator": "owner", "actions": ["read", "write"] },
            { "discriminator": "auditor", "actions": ["read"], "cascade": false,
              "resource": { "kind": "class", "class": "Report" } }
        ]
    }"#;

    #[test]
    fn test_settings_parse() {
        let settings = AclSettings::from_json(SETTINGS).unwrap();

        assert_eq!(settings.security_identity_type, "user");
        assert_eq!(settings.bulk_batch_size, 50);
        assert_eq!(settings.roles.len(), 2);
        assert!(settings.roles[0].cascade);
        assert!(!settings.roles[1].cascade);
        assert_eq!(settings.roles[1].resource, Some(Resource::class("Report")));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = AclSettings::from_json(r#"{"security_identity_type": "user"}"#).unwrap();
        assert_eq!(settings.bulk_batch_size, DEFAULT_BULK_BATCH_SIZE);
        assert!(settings.actions.is_none());
        assert!(settings.roles.is_empty());

        let setup = settings.into_setup().unwrap();
        assert_eq!(setup.action_schema(), &ActionSchema::default());
    }

    #[test]
    fn test_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SETTINGS.as_bytes()).unwrap();

        let settings = AclSettings::from_file(file.path()).unwrap();
        let setup = settings.into_setup().unwrap();
        assert_eq!(setup.action_schema().names(), &["read", "write", "delete"]);
        assert_eq!(setup.roles.discriminators(), vec!["auditor", "owner"]);
        assert_eq!(setup.bulk_batch_size, 50);
    }

    #[test]
    fn test_settings_errors() {
        assert!(matches!(
            AclSettings::from_file("/nonexistent/acl.json"),
            Err(AclError::Io(_))
        ));
        assert!(matches!(
            AclSettings::from_json("{"),
            Err(AclError::Serialization(_))
        ));

        let unknown_action = AclSettings::from_json(
            r#"{"security_identity_type": "user", "roles": [{"discriminator": "x", "actions": ["fly"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            unknown_action.into_setup(),
            Err(AclError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_build_requires_identity_type() {
        let setup = AclSetup::new();
        let store = Arc::new(setup.in_memory_store());
        let result = setup.build(store.clone(), store);
        assert!(matches!(result, Err(AclError::MisconfiguredEngine(_))));
    }

    #[test]
    fn test_build() {
        let setup = AclSetup::new()
            .set_security_identity_type("user")
            .register_role("owner", Arc::new(ResourceRoleDefinition::new(["view"], true)))
            .unwrap();
        let store = Arc::new(setup.in_memory_store());

        let acl = setup.build(store.clone(), store).unwrap();
        assert_eq!(acl.config().security_identity_type, "user");
        assert!(acl.roles().contains("owner"));
    }
}
