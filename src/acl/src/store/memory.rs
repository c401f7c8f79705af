//! In-memory authorization and role store
//!
//! Behaves like the relational backend: ids come from sequences, rows are
//! staged per transaction and only become visible on commit, and deletes
//! follow the role and parent foreign keys.

use super::{AuthorizationStore, RoleStore, DEFAULT_BULK_BATCH_SIZE};
use crate::actions::ActionSchema;
use crate::authorization::{Authorization, AuthorizationBatch, AuthorizationId, ParentRef};
use crate::error::{AclError, Result};
use crate::identity::SecurityIdentity;
use crate::resource::{EntityResource, Resource};
use crate::role::{Role, RoleId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    authorizations: BTreeMap<AuthorizationId, Authorization>,
    roles: BTreeMap<RoleId, Role>,
    authorization_seq: AuthorizationId,
    role_seq: RoleId,
    committed_transactions: usize,
}

impl State {
    fn next_authorization_id(&mut self) -> AuthorizationId {
        self.authorization_seq += 1;
        self.authorization_seq
    }

    fn next_role_id(&mut self) -> RoleId {
        self.role_seq += 1;
        self.role_seq
    }

    /// Delete `roots` and every authorization descending from them
    fn delete_cascade(&mut self, roots: Vec<AuthorizationId>) -> u64 {
        let mut doomed: HashSet<AuthorizationId> = roots.into_iter().collect();
        loop {
            let children: Vec<AuthorizationId> = self
                .authorizations
                .values()
                .filter(|a| matches!(a.parent, Some(ParentRef::Persisted(p)) if doomed.contains(&p)))
                .filter_map(|a| a.id)
                .filter(|id| !doomed.contains(id))
                .collect();
            if children.is_empty() {
                break;
            }
            doomed.extend(children);
        }

        let mut removed = 0;
        for id in doomed {
            if self.authorizations.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

/// In-memory store implementing both [`AuthorizationStore`] and [`RoleStore`]
#[derive(Clone)]
pub struct InMemoryAclStore {
    schema: ActionSchema,
    bulk_batch_size: usize,
    state: Arc<RwLock<State>>,
}

impl InMemoryAclStore {
    /// Create an empty store for the given action schema
    pub fn new(schema: ActionSchema) -> Self {
        Self::with_batch_size(schema, DEFAULT_BULK_BATCH_SIZE)
    }

    /// Create an empty store committing every `bulk_batch_size` rows
    pub fn with_batch_size(schema: ActionSchema, bulk_batch_size: usize) -> Self {
        Self {
            schema,
            bulk_batch_size: bulk_batch_size.max(1),
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Snapshot of every stored authorization, ordered by id
    pub async fn authorizations(&self) -> Vec<Authorization> {
        self.state.read().await.authorizations.values().cloned().collect()
    }

    /// Number of stored authorizations
    pub async fn authorization_count(&self) -> usize {
        self.state.read().await.authorizations.len()
    }

    /// Number of transactions committed by bulk inserts so far
    pub async fn committed_transactions(&self) -> usize {
        self.state.read().await.committed_transactions
    }

    fn check_action(&self, action: &str) -> Result<usize> {
        self.schema.index_of(action)
    }
}

impl Default for InMemoryAclStore {
    fn default() -> Self {
        Self::new(ActionSchema::default())
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryAclStore {
    async fn insert_bulk(&self, batch: &mut AuthorizationBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let mut staged: Vec<Authorization> = Vec::new();
        let mut first_index = 0;

        for index in 0..batch.len() {
            let parent_id = match batch.resolve_parent(index) {
                Ok(parent_id) => parent_id,
                Err(e) => {
                    batch.clear_ids(first_index..first_index + staged.len());
                    return Err(e);
                }
            };

            let Some(entry) = batch.get(index) else {
                break;
            };

            let violation = if entry.actions.schema() != &self.schema {
                Some(AclError::SchemaMismatch(format!(
                    "authorization #{} was built for another action schema",
                    index
                )))
            } else if !state.roles.contains_key(&entry.role_id) {
                Some(AclError::DatabaseError(format!(
                    "Foreign key violation: role {} does not exist",
                    entry.role_id
                )))
            } else {
                parent_id
                    .filter(|p| {
                        !state.authorizations.contains_key(p) && !staged.iter().any(|s| s.id == Some(*p))
                    })
                    .map(|p| {
                        AclError::DatabaseError(format!(
                            "Foreign key violation: parent authorization {} does not exist",
                            p
                        ))
                    })
            };
            if let Some(e) = violation {
                batch.clear_ids(first_index..first_index + staged.len());
                return Err(e);
            }

            let mut row = entry.clone();
            let id = state.next_authorization_id();
            row.id = Some(id);
            row.parent = parent_id.map(ParentRef::Persisted);
            staged.push(row);
            batch.set_id(index, Some(id));

            if staged.len() == self.bulk_batch_size {
                for row in staged.drain(..) {
                    if let Some(id) = row.id {
                        state.authorizations.insert(id, row);
                    }
                }
                state.committed_transactions += 1;
                first_index = index + 1;
                debug!("Committed bulk insert transaction ending at row {}", index);
            }
        }

        if !staged.is_empty() {
            for row in staged.drain(..) {
                if let Some(id) = row.id {
                    state.authorizations.insert(id, row);
                }
            }
            state.committed_transactions += 1;
        }

        Ok(())
    }

    async fn is_allowed_on_entity(
        &self,
        identity: &SecurityIdentity,
        action: &str,
        entity: &EntityResource,
    ) -> Result<bool> {
        let entity_id = entity.require_id()?;
        let index = self.check_action(action)?;

        let state = self.state.read().await;
        Ok(state.authorizations.values().any(|a| {
            a.security_identity == identity.id
                && a.entity_class == entity.class
                && a.entity_id.as_deref() == Some(entity_id)
                && a.actions.flags().get(index).copied().unwrap_or(false)
        }))
    }

    async fn is_allowed_on_entity_class(
        &self,
        identity: &SecurityIdentity,
        action: &str,
        class: &str,
    ) -> Result<bool> {
        let index = self.check_action(action)?;

        let state = self.state.read().await;
        Ok(state.authorizations.values().any(|a| {
            a.security_identity == identity.id
                && a.entity_class == class
                && a.actions.flags().get(index).copied().unwrap_or(false)
        }))
    }

    async fn find_cascadable_authorizations_for_resource(
        &self,
        resource: &Resource,
    ) -> Result<Vec<Authorization>> {
        let state = self.state.read().await;
        Ok(state
            .authorizations
            .values()
            .filter(|a| a.cascadable && a.is_root() && a.applies_to(resource))
            .cloned()
            .collect())
    }

    async fn remove_authorizations_for_resource(&self, resource: &Resource) -> Result<u64> {
        resource.entity_id()?;

        let mut state = self.state.write().await;
        let direct: Vec<AuthorizationId> = state
            .authorizations
            .values()
            .filter(|a| a.applies_to(resource))
            .filter_map(|a| a.id)
            .collect();
        let count = direct.len() as u64;
        let removed = state.delete_cascade(direct);

        debug!(
            "Removed {} authorizations on {} ({} including cascaded)",
            count, resource, removed
        );
        Ok(count)
    }

    async fn remove_all_authorizations(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let count = state.authorizations.len() as u64;
        state.authorizations.clear();
        Ok(count)
    }
}

#[async_trait]
impl RoleStore for InMemoryAclStore {
    async fn save_role(&self, role: &mut Role) -> Result<RoleId> {
        let mut state = self.state.write().await;
        let id = match role.id {
            Some(id) => id,
            None => state.next_role_id(),
        };
        role.id = Some(id);
        state.roles.insert(id, role.clone());
        Ok(id)
    }

    async fn delete_role(&self, role_id: RoleId) -> Result<()> {
        let mut state = self.state.write().await;
        state.roles.remove(&role_id);

        let owned: Vec<AuthorizationId> = state
            .authorizations
            .values()
            .filter(|a| a.role_id == role_id)
            .filter_map(|a| a.id)
            .collect();
        let removed = state.delete_cascade(owned);

        debug!("Deleted role {} and {} authorizations", role_id, removed);
        Ok(())
    }

    async fn get_role(&self, role_id: RoleId) -> Result<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_all_roles(&self) -> Result<Vec<Role>> {
        Ok(self.state.read().await.roles.values().cloned().collect())
    }

    async fn find_roles_directly_linked_to_resource(&self, resource: &Resource) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let mut role_ids: Vec<RoleId> = state
            .authorizations
            .values()
            .filter(|a| a.is_root() && a.applies_to(resource))
            .map(|a| a.role_id)
            .collect();
        role_ids.sort_unstable();
        role_ids.dedup();

        Ok(role_ids
            .into_iter()
            .filter_map(|id| state.roles.get(&id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionSet;

    fn schema() -> ActionSchema {
        ActionSchema::new(["read", "write", "delete"]).unwrap()
    }

    fn read_write() -> ActionSet {
        schema().actions(&["read", "write"]).unwrap()
    }

    async fn saved_role(store: &InMemoryAclStore, identity: &SecurityIdentity) -> Role {
        let mut role = Role::new("owner", identity);
        store.save_role(&mut role).await.unwrap();
        role
    }

    fn root_and_child(role: &Role) -> (Authorization, Authorization) {
        let root =
            Authorization::create(role, read_write(), &Resource::entity("Document", "42"), true).unwrap();
        let child = root
            .create_child_authorization(ParentRef::Batch(0), &Resource::entity("Section", "7"))
            .unwrap();
        (root, child)
    }

    #[tokio::test]
    async fn test_insert_parent_then_child() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let mut batch: AuthorizationBatch = vec![root, child].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        let rows = store.authorizations().await;
        assert_eq!(rows.len(), 2);
        let parent_id = batch.get(0).unwrap().id.unwrap();
        assert_eq!(rows[1].parent, Some(ParentRef::Persisted(parent_id)));
        assert_eq!(batch.get(1).unwrap().id, rows[1].id);
    }

    #[tokio::test]
    async fn test_child_before_parent_is_rejected() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, mut child) = root_and_child(&role);
        child.parent = Some(ParentRef::Batch(1));
        let mut batch: AuthorizationBatch = vec![child, root].into_iter().collect();

        let result = store.insert_bulk(&mut batch).await;
        assert!(matches!(result, Err(AclError::DanglingParent { index: 0 })));
        assert_eq!(store.authorization_count().await, 0);
        assert!(batch.iter().all(|a| a.id.is_none()));
    }

    #[tokio::test]
    async fn test_transactions_are_bounded() {
        let store = InMemoryAclStore::with_batch_size(schema(), 10);
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let root =
            Authorization::create(&role, read_write(), &Resource::entity("Document", "1"), true).unwrap();
        let mut batch = AuthorizationBatch::new();
        batch.push(root.clone());
        for i in 0..24 {
            let child = root
                .create_child_authorization(ParentRef::Batch(0), &Resource::entity("Section", i.to_string()))
                .unwrap();
            batch.push(child);
        }

        store.insert_bulk(&mut batch).await.unwrap();
        assert_eq!(store.authorization_count().await, 25);
        assert_eq!(store.committed_transactions().await, 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_committed_transactions() {
        let store = InMemoryAclStore::with_batch_size(schema(), 2);
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let mut orphan = child.clone();
        orphan.parent = Some(ParentRef::Batch(4));
        let mut batch: AuthorizationBatch =
            vec![root, child.clone(), child, orphan].into_iter().collect();

        let result = store.insert_bulk(&mut batch).await;
        assert!(matches!(result, Err(AclError::DanglingParent { index: 3 })));

        // First transaction (rows 0 and 1) committed, second rolled back
        assert_eq!(store.authorization_count().await, 2);
        assert!(batch.get(1).unwrap().id.is_some());
        assert!(batch.get(2).unwrap().id.is_none());
    }

    #[tokio::test]
    async fn test_permission_queries() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let other = SecurityIdentity::new("user", "v");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let mut batch: AuthorizationBatch = vec![root, child].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        let doc = EntityResource::new("Document", "42");
        assert!(store.is_allowed_on_entity(&user, "read", &doc).await.unwrap());
        assert!(!store.is_allowed_on_entity(&user, "delete", &doc).await.unwrap());
        assert!(!store.is_allowed_on_entity(&other, "read", &doc).await.unwrap());
        assert!(store.is_allowed_on_entity_class(&user, "write", "Section").await.unwrap());
        assert!(matches!(
            store.is_allowed_on_entity(&user, "fly", &doc).await,
            Err(AclError::UnknownAction(_))
        ));
        assert!(matches!(
            store
                .is_allowed_on_entity(&user, "read", &EntityResource::unpersisted("Document"))
                .await,
            Err(AclError::UnpersistedResource(_))
        ));
    }

    #[tokio::test]
    async fn test_find_cascadable_roots_only() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let flat = Authorization::create(&role, read_write(), &Resource::entity("Document", "42"), false)
            .unwrap();
        let mut batch: AuthorizationBatch = vec![root, child, flat].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        let doc_roots = store
            .find_cascadable_authorizations_for_resource(&Resource::entity("Document", "42"))
            .await
            .unwrap();
        assert_eq!(doc_roots.len(), 1);
        assert!(doc_roots[0].cascadable && doc_roots[0].is_root());

        let section_roots = store
            .find_cascadable_authorizations_for_resource(&Resource::entity("Section", "7"))
            .await
            .unwrap();
        assert!(section_roots.is_empty());
    }

    #[tokio::test]
    async fn test_remove_for_resource_cascades_to_children() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let mut batch: AuthorizationBatch = vec![root, child].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        let removed = store
            .remove_authorizations_for_resource(&Resource::entity("Document", "42"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.authorization_count().await, 0);

        assert!(matches!(
            store
                .remove_authorizations_for_resource(&Resource::Entity(EntityResource::unpersisted(
                    "Document"
                )))
                .await,
            Err(AclError::UnpersistedResource(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_role_removes_authorizations() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;
        let keeper = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let kept = Authorization::create(&keeper, read_write(), &Resource::class("Report"), false).unwrap();
        let mut batch: AuthorizationBatch = vec![root, child, kept].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        store.delete_role(role.id.unwrap()).await.unwrap();

        assert!(store.get_role(role.id.unwrap()).await.unwrap().is_none());
        let rows = store.authorizations().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role_id, keeper.id.unwrap());
    }

    #[tokio::test]
    async fn test_roles_directly_linked() {
        let store = InMemoryAclStore::new(schema());
        let user = SecurityIdentity::new("user", "u");
        let role = saved_role(&store, &user).await;

        let (root, child) = root_and_child(&role);
        let twice = root.clone();
        let mut batch: AuthorizationBatch = vec![root, child, twice].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        let direct = store
            .find_roles_directly_linked_to_resource(&Resource::entity("Document", "42"))
            .await
            .unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].id, role.id);

        let inherited = store
            .find_roles_directly_linked_to_resource(&Resource::entity("Section", "7"))
            .await
            .unwrap();
        assert!(inherited.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let store = InMemoryAclStore::new(schema());
        let mut role = Role::new("owner", &SecurityIdentity::new("user", "u"));
        role.id = Some(99);

        let root =
            Authorization::create(&role, read_write(), &Resource::entity("Document", "1"), true).unwrap();
        let mut batch: AuthorizationBatch = vec![root].into_iter().collect();
        assert!(matches!(
            store.insert_bulk(&mut batch).await,
            Err(AclError::DatabaseError(_))
        ));
        assert_eq!(store.authorization_count().await, 0);
    }
}
