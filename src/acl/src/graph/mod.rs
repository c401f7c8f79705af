//! Resource graph traversal
//!
//! Resources that cascade authorizations expose their immediate parents and
//! sub-resources through a [`ResourceHierarchy`] registered for their class.
//! A [`ResourceGraphTraverser`] turns that adjacency into the complete
//! transitive set of parents or sub-resources.
//!
//! # Features
//!
//! - **Cycle safety**: visited resources are tracked, so malformed graphs with
//!   back-edges still terminate and never yield the origin
//! - **Deterministic order**: depth-first pre-order, an ancestor always comes
//!   before its descendants
//! - **Per-class dispatch**: custom traversers can be registered for classes
//!   that need different adjacency rules
//!
//! # Example
//!
//! ```rust
//! use cretoai_acl::graph::{
//!     CascadingResourceGraphTraverser, ResourceGraphTraverser, StaticHierarchy,
//! };
//! use cretoai_acl::Resource;
//! use std::sync::Arc;
//!
//! # async fn example() -> cretoai_acl::Result<()> {
//! let hierarchy = Arc::new(StaticHierarchy::new());
//! hierarchy.add_child(Resource::entity("Document", "42"), Resource::entity("Section", "7"));
//!
//! let mut traverser = CascadingResourceGraphTraverser::new();
//! traverser.register_hierarchy("Document", hierarchy.clone());
//! traverser.register_hierarchy("Section", hierarchy);
//!
//! let subs = traverser.all_sub_resources(&Resource::entity("Document", "42")).await?;
//! assert_eq!(subs, vec![Resource::entity("Section", "7")]);
//! # Ok(())
//! # }
//! ```

pub mod cascading;
pub mod dispatcher;
pub mod static_hierarchy;


pub use cascading::CascadingResourceGraphTraverser;
pub use dispatcher::ResourceGraphTraverserDispatcher;
pub use static_hierarchy::StaticHierarchy;

use crate::error::Result;
use crate::resource::Resource;
use async_trait::async_trait;

/// Immediate neighbours of cascading resources
///
/// Registering a hierarchy for a class is what makes resources of that class
/// cascade. Returned sequences may be empty.
#[async_trait]
pub trait ResourceHierarchy: Send + Sync {
    /// Direct parents of `resource`
    async fn parent_resources(&self, resource: &Resource) -> Result<Vec<Resource>>;

    /// Direct sub-resources of `resource`
    async fn sub_resources(&self, resource: &Resource) -> Result<Vec<Resource>>;
}

/// Transitive traversal of the resource graph
#[async_trait]
pub trait ResourceGraphTraverser: Send + Sync {
    /// Every ancestor of `resource`, without duplicates and without `resource`
    async fn all_parent_resources(&self, resource: &Resource) -> Result<Vec<Resource>>;

    /// Every descendant of `resource`, without duplicates and without `resource`
    async fn all_sub_resources(&self, resource: &Resource) -> Result<Vec<Resource>>;
}
