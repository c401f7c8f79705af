//! Per-class traverser dispatch

use super::{CascadingResourceGraphTraverser, ResourceGraphTraverser};
use crate::error::Result;
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Chooses the traverser for a resource by its class
///
/// Classes without a dedicated traverser use the default one, normally a
/// [`CascadingResourceGraphTraverser`]. Populated during setup and read-only
/// afterwards.
#[derive(Clone)]
pub struct ResourceGraphTraverserDispatcher {
    traversers: HashMap<String, Arc<dyn ResourceGraphTraverser>>,
    default: Arc<dyn ResourceGraphTraverser>,
}

impl ResourceGraphTraverserDispatcher {
    /// Dispatcher falling back to `default`
    pub fn new(default: Arc<dyn ResourceGraphTraverser>) -> Self {
        Self {
            traversers: HashMap::new(),
            default,
        }
    }

    /// Use `traverser` for resources of `class`
    pub fn register(&mut self, class: impl Into<String>, traverser: Arc<dyn ResourceGraphTraverser>) {
        self.traversers.insert(class.into(), traverser);
    }

    /// Traverser responsible for a resource
    pub fn traverser_for(&self, resource: &Resource) -> &Arc<dyn ResourceGraphTraverser> {
        match self.traversers.get(resource.class_name()) {
            Some(traverser) => {
                debug!("Using dedicated traverser for class {}", resource.class_name());
                traverser
            }
            None => &self.default,
        }
    }
}

impl Default for ResourceGraphTraverserDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(CascadingResourceGraphTraverser::new()))
    }
}

#[async_trait]
impl ResourceGraphTraverser for ResourceGraphTraverserDispatcher {
    async fn all_parent_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.traverser_for(resource).all_parent_resources(resource).await
    }

    async fn all_sub_resources(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.traverser_for(resource).all_sub_resources(resource).await
    }
}

impl std::fmt::Debug for ResourceGraphTraverserDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.traversers.keys().collect();
        classes.sort();
        f.debug_struct("ResourceGraphTraverserDispatcher")
            .field("dedicated", &classes)
            .finish()
    }
}
