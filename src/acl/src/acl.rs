//! Access control facade
//!
//! # Architecture
//!
//! ```text
//! grant ──► RoleDefinition ──► allow ──► CascadeStrategy ──► Traverser
//!                                │                              │
//!                                ▼                              ▼
//!                        AuthorizationStore ◄─── sub-resources / ancestors
//!                                ▲
//! process_new_resource ──────────┘
//! ```

use crate::actions::{ActionSchema, ActionSet};
use crate::authorization::{Authorization, AuthorizationBatch, ParentRef};
use crate::cascade::CascadeStrategy;
use crate::config::AclConfig;
use crate::error::{AclError, Result};
use crate::identity::SecurityIdentity;
use crate::resource::Resource;
use crate::role::{Role, RoleRegistry};
use crate::store::{AuthorizationStore, RoleStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Access control engine
///
/// Built by [`crate::AclSetup::build`]. The registrations it holds are
/// read-only; all mutable state lives in the stores.
pub struct Acl {
    config: AclConfig,
    roles: RoleRegistry,
    authorization_store: Arc<dyn AuthorizationStore>,
    role_store: Arc<dyn RoleStore>,
    strategy: Arc<dyn CascadeStrategy>,
}

impl Acl {
    pub(crate) fn new(
        config: AclConfig,
        roles: RoleRegistry,
        authorization_store: Arc<dyn AuthorizationStore>,
        role_store: Arc<dyn RoleStore>,
        strategy: Arc<dyn CascadeStrategy>,
    ) -> Self {
        Self {
            config,
            roles,
            authorization_store,
            role_store,
            strategy,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    /// Action schema of every authorization
    pub fn action_schema(&self) -> &ActionSchema {
        &self.config.action_schema
    }

    /// Registered role kinds
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    fn check_identity(&self, identity: &SecurityIdentity) -> Result<()> {
        if identity.identity_type != self.config.security_identity_type {
            return Err(AclError::InvalidInput(format!(
                "Security identity {} has type '{}', expected '{}'",
                identity.id, identity.identity_type, self.config.security_identity_type
            )));
        }
        Ok(())
    }

    /// Whether `identity` may perform `action` on `resource`
    ///
    /// # Errors
    ///
    /// - [`AclError::UnpersistedResource`] for an entity without id
    /// - [`AclError::UnknownAction`] if `action` is not in the schema
    pub async fn is_allowed(
        &self,
        identity: &SecurityIdentity,
        action: &str,
        resource: &Resource,
    ) -> Result<bool> {
        self.check_identity(identity)?;

        let allowed = match resource {
            Resource::Entity(entity) => {
                self.authorization_store
                    .is_allowed_on_entity(identity, action, entity)
                    .await?
            }
            Resource::Class(class) => {
                self.authorization_store
                    .is_allowed_on_entity_class(identity, action, &class.class)
                    .await?
            }
        };

        debug!(
            "is_allowed({}, {}, {}) = {}",
            identity.id, action, resource, allowed
        );
        Ok(allowed)
    }

    /// Grant `actions` on `resource` to `role`
    ///
    /// With `cascade`, every transitive sub-resource receives a child
    /// authorization as well. The root is written first so it has an id
    /// before its children are written.
    pub async fn allow(
        &self,
        role: &Role,
        actions: ActionSet,
        resource: &Resource,
        cascade: bool,
    ) -> Result<()> {
        if actions.schema() != self.action_schema() {
            return Err(AclError::SchemaMismatch(format!(
                "action set {} was not built from the engine's schema",
                actions
            )));
        }

        let root = Authorization::create(role, actions, resource, cascade)?;

        let mut batch = AuthorizationBatch::new();
        let root_slot = batch.push(root);

        if cascade {
            if let Some(root) = batch.get(root_slot).cloned() {
                let children = self
                    .strategy
                    .cascade_authorization(&root, ParentRef::Batch(root_slot), resource)
                    .await?;
                batch.extend(children);
            }
        }

        debug!(
            "Allowing role {} on {}: {} authorizations",
            role.kind,
            resource,
            batch.len()
        );
        self.authorization_store.insert_bulk(&mut batch).await
    }

    /// Give `role` to `identity` and create its authorizations
    ///
    /// The role is persisted first, then its definition issues the
    /// [`Acl::allow`] calls it implies. If that fails, a role saved by this
    /// call is deleted again and taken off the identity, along with any
    /// authorizations already written for it.
    ///
    /// # Errors
    ///
    /// [`AclError::MisconfiguredEngine`] if no definition is registered for
    /// the role's discriminator.
    pub async fn grant(&self, identity: &mut SecurityIdentity, role: &mut Role) -> Result<()> {
        self.check_identity(identity)?;
        let definition = self.roles.get(&role.kind)?;

        let is_new = role.id.is_none();
        role.security_identity = identity.id.clone();
        let role_id = self.role_store.save_role(role).await?;
        identity.add_role(role_id);

        if let Err(e) = definition.create_authorizations(role, self).await {
            if is_new {
                warn!("Granting role {} ({}) failed, removing it: {}", role.kind, role_id, e);
                identity.remove_role(role_id);
                if let Err(cleanup) = self.role_store.delete_role(role_id).await {
                    warn!("Failed to remove role {}: {}", role_id, cleanup);
                }
                role.id = None;
            }
            return Err(e);
        }

        info!("Granted role {} ({}) to {}", role.kind, role_id, identity.id);
        Ok(())
    }

    /// Take `role` away from `identity`
    ///
    /// Deleting the role removes its authorizations through the store's
    /// relational cascade.
    pub async fn revoke(&self, identity: &mut SecurityIdentity, role: &Role) -> Result<()> {
        self.check_identity(identity)?;
        let role_id = role.require_id()?;

        identity.remove_role(role_id);
        self.role_store.delete_role(role_id).await?;

        info!("Revoked role {} ({}) from {}", role.kind, role_id, identity.id);
        Ok(())
    }

    /// Give a newly created resource the authorizations it inherits from
    /// the cascadable grants of its ancestors
    pub async fn process_new_resource(&self, resource: &Resource) -> Result<()> {
        let inherited = self.strategy.process_new_resource(resource).await?;
        if inherited.is_empty() {
            return Ok(());
        }

        let mut batch: AuthorizationBatch = inherited.into_iter().collect();
        debug!("New resource {}: {} inherited authorizations", resource, batch.len());
        self.authorization_store.insert_bulk(&mut batch).await
    }

    /// Drop the authorizations of a deleted resource
    ///
    /// Only rows scoped to exactly `resource` are deleted here; the rows
    /// cascaded from them go with them through the store.
    pub async fn process_deleted_resource(&self, resource: &Resource) -> Result<()> {
        let removed = self
            .authorization_store
            .remove_authorizations_for_resource(resource)
            .await?;
        debug!("Deleted resource {}: {} authorizations removed", resource, removed);
        Ok(())
    }

    /// Recompute the authorizations of one resource
    ///
    /// Every authorization on the resource is deleted before anything is
    /// derived again, then inherited grants are re-derived and the roles
    /// granted directly on the resource re-issue theirs.
    pub async fn rebuild_authorizations_for_resource(&self, resource: &Resource) -> Result<()> {
        let direct_roles = self
            .role_store
            .find_roles_directly_linked_to_resource(resource)
            .await?;

        self.authorization_store
            .remove_authorizations_for_resource(resource)
            .await?;

        self.process_new_resource(resource).await?;

        for role in &direct_roles {
            self.roles
                .get(&role.kind)?
                .create_authorizations(role, self)
                .await?;
        }

        info!(
            "Rebuilt authorizations for {} ({} direct roles)",
            resource,
            direct_roles.len()
        );
        Ok(())
    }

    /// Recompute every authorization from the roles
    ///
    /// Deletes everything first, so a grant or revoke running at the same
    /// time can be lost. Only run with external exclusivity.
    pub async fn rebuild_authorizations(&self) -> Result<()> {
        warn!("Full authorization rebuild started; concurrent grants and revokes may be lost");

        let removed = self.authorization_store.remove_all_authorizations().await?;
        let roles = self.role_store.find_all_roles().await?;

        for role in &roles {
            self.roles
                .get(&role.kind)?
                .create_authorizations(role, self)
                .await?;
        }

        info!(
            "Full authorization rebuild done: {} removed, {} roles replayed",
            removed,
            roles.len()
        );
        Ok(())
    }
}

impl std::fmt::Debug for Acl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acl")
            .field("config", &self.config)
            .field("roles", &self.roles)
            .finish()
    }
}
