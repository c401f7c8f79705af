//! Cascade strategies: deriving authorizations from the resource graph
//!
//! Strategies only derive authorizations; persisting them is the caller's job.

use crate::authorization::{Authorization, ParentRef};
use crate::error::{AclError, Result};
use crate::graph::ResourceGraphTraverser;
use crate::resource::Resource;
use crate::store::AuthorizationStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Defines how authorizations cascade between resources
#[async_trait]
pub trait CascadeStrategy: Send + Sync {
    /// Child authorizations of `authorization` (granted on `resource`) for
    /// every sub-resource of `resource`
    ///
    /// `parent` locates `authorization` in the batch being built, or its id
    /// when it is already persisted.
    async fn cascade_authorization(
        &self,
        authorization: &Authorization,
        parent: ParentRef,
        resource: &Resource,
    ) -> Result<Vec<Authorization>>;

    /// Authorizations a newly created `resource` inherits from the cascadable
    /// root authorizations of its ancestors
    async fn process_new_resource(&self, resource: &Resource) -> Result<Vec<Authorization>>;
}

/// Authorizations cascade from a resource to all of its sub-resources
///
/// Redundant authorizations are not deduplicated: when several ancestors
/// each hold a cascadable root for the same role, the new resource receives
/// one child per root. Permission checks test for existence, so duplicates
/// are harmless.
pub struct SimpleCascadeStrategy {
    traverser: Arc<dyn ResourceGraphTraverser>,
    store: Arc<dyn AuthorizationStore>,
}

impl SimpleCascadeStrategy {
    /// Create a strategy walking `traverser` and reading roots from `store`
    pub fn new(traverser: Arc<dyn ResourceGraphTraverser>, store: Arc<dyn AuthorizationStore>) -> Self {
        Self { traverser, store }
    }
}

#[async_trait]
impl CascadeStrategy for SimpleCascadeStrategy {
    async fn cascade_authorization(
        &self,
        authorization: &Authorization,
        parent: ParentRef,
        resource: &Resource,
    ) -> Result<Vec<Authorization>> {
        let sub_resources = self.traverser.all_sub_resources(resource).await?;

        let children = sub_resources
            .iter()
            .map(|sub_resource| authorization.create_child_authorization(parent, sub_resource))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Cascaded authorization of role {} on {} to {} sub-resources",
            authorization.role_id,
            resource,
            children.len()
        );

        Ok(children)
    }

    async fn process_new_resource(&self, resource: &Resource) -> Result<Vec<Authorization>> {
        let parent_resources = self.traverser.all_parent_resources(resource).await?;

        let mut inherited = Vec::new();
        for parent_resource in &parent_resources {
            let roots = self
                .store
                .find_cascadable_authorizations_for_resource(parent_resource)
                .await?;

            for root in roots {
                let parent = ParentRef::of(&root).ok_or_else(|| {
                    AclError::DatabaseError(format!(
                        "Stored authorization on {} has no id",
                        parent_resource
                    ))
                })?;
                inherited.push(root.create_child_authorization(parent, resource)?);
            }
        }

        debug!(
            "New resource {} inherits {} authorizations from {} ancestors",
            resource,
            inherited.len(),
            parent_resources.len()
        );

        Ok(inherited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionSchema;
    use crate::authorization::AuthorizationBatch;
    use crate::graph::{CascadingResourceGraphTraverser, StaticHierarchy};
    use crate::identity::SecurityIdentity;
    use crate::role::Role;
    use crate::store::{InMemoryAclStore, RoleStore};

    fn doc(id: &str) -> Resource {
        Resource::entity("Document", id)
    }

    fn section(id: &str) -> Resource {
        Resource::entity("Section", id)
    }

    fn strategy(store: &InMemoryAclStore) -> (SimpleCascadeStrategy, Arc<StaticHierarchy>) {
        let hierarchy = Arc::new(StaticHierarchy::new());
        hierarchy.add_child(doc("1"), section("1"));
        hierarchy.add_child(doc("1"), section("2"));
        hierarchy.add_child(section("1"), Resource::entity("Paragraph", "1"));

        let mut traverser = CascadingResourceGraphTraverser::new();
        for class in ["Document", "Section", "Paragraph"] {
            traverser.register_hierarchy(class, hierarchy.clone());
        }
        (
            SimpleCascadeStrategy::new(Arc::new(traverser), Arc::new(store.clone())),
            hierarchy,
        )
    }

    async fn owner(store: &InMemoryAclStore) -> Role {
        let mut role = Role::new("owner", &SecurityIdentity::new("user", "u"));
        store.save_role(&mut role).await.unwrap();
        role
    }

    #[tokio::test]
    async fn test_cascade_covers_every_sub_resource() {
        let store = InMemoryAclStore::default();
        let (strategy, _) = strategy(&store);
        let role = owner(&store).await;

        let root = Authorization::create(&role, ActionSchema::default().all(), &doc("1"), true).unwrap();
        let children = strategy
            .cascade_authorization(&root, ParentRef::Batch(0), &doc("1"))
            .await
            .unwrap();

        let resources: Vec<Resource> = children.iter().map(Authorization::resource).collect();
        assert_eq!(
            resources,
            vec![section("1"), Resource::entity("Paragraph", "1"), section("2")]
        );
        assert!(children.iter().all(|c| c.parent == Some(ParentRef::Batch(0))));
        assert!(children.iter().all(|c| c.cascadable && c.actions == root.actions));
    }

    #[tokio::test]
    async fn test_cascade_on_leaf_is_empty() {
        let store = InMemoryAclStore::default();
        let (strategy, _) = strategy(&store);
        let role = owner(&store).await;

        let root = Authorization::create(&role, ActionSchema::default().all(), &section("2"), true).unwrap();
        let children = strategy
            .cascade_authorization(&root, ParentRef::Batch(0), &section("2"))
            .await
            .unwrap();
        assert!(children.is_empty());
    }

    #[tokio::test]
    async fn test_new_resource_inherits_cascadable_roots() {
        let store = InMemoryAclStore::default();
        let (strategy, hierarchy) = strategy(&store);
        let role = owner(&store).await;

        let cascading = Authorization::create(&role, ActionSchema::default().all(), &doc("1"), true).unwrap();
        let flat = Authorization::create(&role, ActionSchema::default().all(), &doc("1"), false).unwrap();
        let mut batch: AuthorizationBatch = vec![cascading, flat].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        hierarchy.add_child(section("2"), Resource::entity("Paragraph", "9"));
        let inherited = strategy
            .process_new_resource(&Resource::entity("Paragraph", "9"))
            .await
            .unwrap();

        assert_eq!(inherited.len(), 1);
        let root_id = batch.get(0).unwrap().id.unwrap();
        assert_eq!(inherited[0].parent, Some(ParentRef::Persisted(root_id)));
        assert_eq!(inherited[0].resource(), Resource::entity("Paragraph", "9"));
    }

    #[tokio::test]
    async fn test_redundant_roots_are_kept() {
        let store = InMemoryAclStore::default();
        let (strategy, hierarchy) = strategy(&store);
        let role = owner(&store).await;

        // Same role granted on the document and on one of its sections
        let on_doc = Authorization::create(&role, ActionSchema::default().all(), &doc("1"), true).unwrap();
        let on_section =
            Authorization::create(&role, ActionSchema::default().all(), &section("1"), true).unwrap();
        let mut batch: AuthorizationBatch = vec![on_doc, on_section].into_iter().collect();
        store.insert_bulk(&mut batch).await.unwrap();

        hierarchy.add_child(section("1"), Resource::entity("Paragraph", "5"));
        let inherited = strategy
            .process_new_resource(&Resource::entity("Paragraph", "5"))
            .await
            .unwrap();
        assert_eq!(inherited.len(), 2);
    }
}
