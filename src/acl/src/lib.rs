//! # CretoAI Access Control Lists
//!
//! Cascading authorization engine: roles held by security identities grant
//! action sets on resources, and the implied permissions are materialized as
//! authorization rows so that a permission check is a single existence query.
//!
//! ## Features
//!
//! - **Cascading grants** over a pluggable resource graph (documents ->
//!   sections -> paragraphs, or any hierarchy the host exposes)
//! - **Inheritance for new resources**: a resource created under a cascadable
//!   grant receives its authorizations immediately
//! - **Bulk writes** in bounded transactions, parents always before children
//! - **Configurable action schema**, one storage column per action
//! - **PostgreSQL backend** (feature `postgres`) and an in-memory backend
//!
//! ## Example
//!
//! ```rust
//! use cretoai_acl::graph::StaticHierarchy;
//! use cretoai_acl::{AclSetup, ResourceRoleDefinition, Resource, Role, SecurityIdentity};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hierarchy = Arc::new(StaticHierarchy::new());
//!     hierarchy.add_child(Resource::entity("Document", "42"), Resource::entity("Section", "7"));
//!
//!     let setup = AclSetup::new()
//!         .set_security_identity_type("user")
//!         .register_hierarchy("Document", hierarchy.clone())
//!         .register_hierarchy("Section", hierarchy)
//!         .register_role("owner", Arc::new(ResourceRoleDefinition::new(["view", "edit"], true)))?;
//!     let store = Arc::new(setup.in_memory_store());
//!     let acl = setup.build(store.clone(), store)?;
//!
//!     let mut alice = SecurityIdentity::new("user", "alice");
//!     let mut owner = Role::new("owner", &alice).on(Resource::entity("Document", "42"));
//!     acl.grant(&mut alice, &mut owner).await?;
//!
//!     assert!(acl.is_allowed(&alice, "edit", &Resource::entity("Section", "7")).await?);
//!     assert!(!acl.is_allowed(&alice, "delete", &Resource::entity("Section", "7")).await?);
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod actions;
pub mod authorization;
pub mod cascade;
pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod query;
pub mod resource;
pub mod role;
pub mod store;

// Re-export commonly used types
pub use acl::Acl;
pub use actions::{ActionSchema, ActionSet};
pub use authorization::{Authorization, AuthorizationBatch, AuthorizationId, ParentRef};
pub use cascade::{CascadeStrategy, SimpleCascadeStrategy};
pub use config::{AclConfig, AclSettings, AclSetup, RoleSettings};
pub use error::{AclError, Result};
pub use graph::{ResourceGraphTraverser, ResourceHierarchy};
pub use identity::SecurityIdentity;
pub use resource::{ClassResource, EntityId, EntityResource, Resource};
pub use role::{ResourceRoleDefinition, Role, RoleDefinition, RoleId, RoleRegistry};
pub use store::{AuthorizationStore, InMemoryAclStore, RoleStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
