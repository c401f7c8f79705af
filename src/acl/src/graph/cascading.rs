//! Default traverser walking registered resource hierarchies

use super::{ResourceGraphTraverser, ResourceHierarchy};
use crate::error::Result;
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Parents,
    SubResources,
}

/// Depth-first traverser over [`ResourceHierarchy`] adjacency
///
/// Each visited resource is expanded with the hierarchy registered for its
/// own class, so a walk can cross from one class to another. Resources of a
/// class without a hierarchy are leaves.
#[derive(Clone, Default)]
pub struct CascadingResourceGraphTraverser {
    hierarchies: HashMap<String, Arc<dyn ResourceHierarchy>>,
}

impl CascadingResourceGraphTraverser {
    /// Create a traverser without hierarchies
    pub fn new() -> Self {
        Self::default()
    }

    /// Make resources of `class` cascade through `hierarchy`
    pub fn register_hierarchy(&mut self, class: impl Into<String>, hierarchy: Arc<dyn ResourceHierarchy>) {
        let class = class.into();
        if self.hierarchies.insert(class.clone(), hierarchy).is_some() {
            warn!("Replacing resource hierarchy registered for class {}", class);
        }
    }

    /// Whether resources of this class cascade
    pub fn is_cascading(&self, resource: &Resource) -> bool {
        self.hierarchies.contains_key(resource.class_name())
    }

    /// Neighbours of one resource in the given direction
    async fn neighbours(&self, resource: &Resource, direction: Direction) -> Result<Vec<Resource>> {
        let Some(hierarchy) = self.hierarchies.get(resource.class_name()) else {
            return Ok(Vec::new());
        };

        match direction {
            Direction::Parents => hierarchy.parent_resources(resource).await,
            Direction::SubResources => hierarchy.sub_resources(resource).await,
        }
    }

    /// Pre-order depth-first walk
    ///
    /// State: `visited` holds every resource already emitted plus the origin,
    /// `stack` the resources still to expand (last pushed = next visited).
    /// Unpersisted entities have no identity to track, so they fail the walk.
    async fn walk(&self, origin: &Resource, direction: Direction) -> Result<Vec<Resource>> {
        origin.entity_id()?;

        let mut visited: HashSet<Resource> = HashSet::new();
        visited.insert(origin.clone());

        let mut found = Vec::new();
        let mut stack: Vec<Resource> = self.neighbours(origin, direction).await?;
        stack.reverse();

        while let Some(current) = stack.pop() {
            current.entity_id()?;
            if !visited.insert(current.clone()) {
                continue;
            }

            let mut next = self.neighbours(&current, direction).await?;
            next.retain(|resource| !visited.contains(resource));
            next.reverse();

            found.push(current);
            stack.extend(next);
        }

        debug!(
            "Resource graph walk from {} ({:?}): {} resources",
            origin,
            direction,
            found.len()
        );

        Ok(found)
    }
}

#[async_trait]
impl ResourceGraphTraverser for CascadingResourceGraphTraverser {
    async fn all_parent_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.walk(resource, Direction::Parents).await
    }

    async fn all_sub_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.walk(resource, Direction::SubResources).await
    }
}

impl std::fmt::Debug for CascadingResourceGraphTraverser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.hierarchies.keys().collect();
        classes.sort();
        f.debug_struct("CascadingResourceGraphTraverser")
            .field("classes", &classes)
            .finish()
    }
}
