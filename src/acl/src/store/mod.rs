//! Authorization and role storage
//!
//! The engine never talks to a database directly: it goes through
//! [`AuthorizationStore`] and [`RoleStore`]. Two backends are provided, an
//! in-memory one and a PostgreSQL one behind the `postgres` feature.
//!
//! # Storage layout
//!
//! ```text
//! acl_role            acl_authorization
//! ─────────────       ────────────────────────────────────────────────
//! id  ◄────────────── role_id                  (ON DELETE CASCADE)
//! discriminator       id  ◄──┐
//! security_identity   parent_authorization_id  (ON DELETE CASCADE)
//! resource            security_identity_id
//! attributes          entity_class, entity_id, cascadable
//!                     actions_<name> ...       (one column per action)
//! ```
//!
//! Deleting a role removes its authorizations, and deleting an authorization
//! removes every authorization cascaded from it.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryAclStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresAclStore;

use crate::authorization::{Authorization, AuthorizationBatch};
use crate::error::Result;
use crate::identity::SecurityIdentity;
use crate::resource::{EntityResource, Resource};
use crate::role::{Role, RoleId};
use async_trait::async_trait;

/// Table holding authorizations
pub const AUTHORIZATION_TABLE: &str = "acl_authorization";

/// Table holding roles
pub const ROLE_TABLE: &str = "acl_role";

/// Rows written per transaction by [`AuthorizationStore::insert_bulk`]
pub const DEFAULT_BULK_BATCH_SIZE: usize = 1000;

/// Authorization store trait
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Write a batch of authorizations in order
    ///
    /// Rows are committed every `bulk_batch_size` rows so that no single
    /// transaction holds the table for long. The generated id of every row is
    /// written back into the batch so later rows can use it as parent.
    ///
    /// # Errors
    ///
    /// [`crate::AclError::DanglingParent`] when a row's parent has no id yet.
    /// The open transaction is rolled back; earlier committed transactions
    /// stay written.
    async fn insert_bulk(&self, batch: &mut AuthorizationBatch) -> Result<()>;

    /// Whether at least one authorization allows `action` on the entity
    async fn is_allowed_on_entity(
        &self,
        identity: &SecurityIdentity,
        action: &str,
        entity: &EntityResource,
    ) -> Result<bool>;

    /// Whether at least one authorization on the class allows `action`
    async fn is_allowed_on_entity_class(
        &self,
        identity: &SecurityIdentity,
        action: &str,
        class: &str,
    ) -> Result<bool>;

    /// Cascadable root authorizations scoped to exactly `resource`
    async fn find_cascadable_authorizations_for_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<Authorization>>;

    /// Delete the authorizations scoped to exactly `resource`, returning the
    /// number of rows deleted directly
    async fn remove_authorizations_for_resource(&self, resource: &Resource) -> Result<u64>;

    /// Delete every authorization
    async fn remove_all_authorizations(&self) -> Result<u64>;
}

/// Role store trait
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Insert or update a role, assigning its id on first save
    async fn save_role(&self, role: &mut Role) -> Result<RoleId>;

    /// Delete a role and, through the relational cascade, its authorizations
    async fn delete_role(&self, role_id: RoleId) -> Result<()>;

    /// Get a role by id
    async fn get_role(&self, role_id: RoleId) -> Result<Option<Role>>;

    /// Every role, ordered by id
    async fn find_all_roles(&self) -> Result<Vec<Role>>;

    /// Distinct roles owning a root authorization scoped to `resource`
    async fn find_roles_directly_linked_to_resource(&self, resource: &Resource) -> Result<Vec<Role>>;
}
