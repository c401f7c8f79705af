//! In-memory resource hierarchy

use super::ResourceHierarchy;
use crate::error::Result;
use crate::resource::Resource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Hierarchy held in memory as explicit parent -> child edges
///
/// The sub-resources of a class resource are every known entity of that
/// class in addition to its explicit children, and every known entity lists
/// its class resource after its explicit parents. Class resources have no
/// parents unless edges say otherwise. Useful for hosts whose hierarchy is
/// small and static, and for tests.
#[derive(Debug, Default)]
pub struct StaticHierarchy {
    children: RwLock<HashMap<Resource, Vec<Resource>>>,
    parents: RwLock<HashMap<Resource, Vec<Resource>>>,
    entities: RwLock<HashMap<String, Vec<Resource>>>,
}

impl StaticHierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `child` is a sub-resource of `parent`
    pub fn add_child(&self, parent: Resource, child: Resource) {
        self.add_entity(&parent);
        self.add_entity(&child);

        let mut children = self.children.write();
        let entry = children.entry(parent.clone()).or_default();
        if !entry.contains(&child) {
            entry.push(child.clone());
        }
        drop(children);

        let mut parents = self.parents.write();
        let entry = parents.entry(child).or_default();
        if !entry.contains(&parent) {
            entry.push(parent);
        }
    }

    /// Record an entity so that its class resource lists it
    pub fn add_entity(&self, resource: &Resource) {
        if let Resource::Entity(entity) = resource {
            let mut entities = self.entities.write();
            let members = entities.entry(entity.class.clone()).or_default();
            if !members.contains(resource) {
                members.push(resource.clone());
            }
        }
    }

    /// Forget a resource and every edge touching it
    pub fn remove(&self, resource: &Resource) {
        let mut children = self.children.write();
        children.remove(resource);
        for list in children.values_mut() {
            list.retain(|child| child != resource);
        }
        drop(children);

        let mut parents = self.parents.write();
        parents.remove(resource);
        for list in parents.values_mut() {
            list.retain(|parent| parent != resource);
        }
        drop(parents);

        let mut entities = self.entities.write();
        for members in entities.values_mut() {
            members.retain(|member| member != resource);
        }
    }
}

#[async_trait]
impl ResourceHierarchy for StaticHierarchy {
    async fn parent_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let mut parents = self.parents.read().get(resource).cloned().unwrap_or_default();

        if let Resource::Entity(entity) = resource {
            let known = self
                .entities
                .read()
                .get(&entity.class)
                .is_some_and(|members| members.contains(resource));
            let class = Resource::class(entity.class.clone());
            if known && !parents.contains(&class) {
                parents.push(class);
            }
        }

        Ok(parents)
    }

    async fn sub_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let mut subs = self.children.read().get(resource).cloned().unwrap_or_default();

        if let Resource::Class(class) = resource {
            if let Some(members) = self.entities.read().get(&class.class) {
                for member in members {
                    if !subs.contains(member) {
                        subs.push(member.clone());
                    }
                }
            }
        }

        Ok(subs)
    }
}
