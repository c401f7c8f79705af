//! Resources that authorizations apply to

use crate::error::{AclError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a persisted entity, opaque to the engine
pub type EntityId = String;

/// A single entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityResource {
    /// Entity class (type name)
    pub class: String,

    /// Entity id, `None` while the entity is not persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
}

impl EntityResource {
    /// Persisted entity
    pub fn new(class: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            class: class.into(),
            id: Some(id.into()),
        }
    }

    /// Entity that has not been persisted yet
    pub fn unpersisted(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: None,
        }
    }

    /// Id of the entity, failing if it was never persisted
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| AclError::UnpersistedResource(self.class.clone()))
    }
}

/// Every instance of an entity class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassResource {
    /// Entity class (type name)
    pub class: String,
}

impl ClassResource {
    /// Create a class resource
    pub fn new(class: impl Into<String>) -> Self {
        Self { class: class.into() }
    }
}

/// Resource an authorization applies to
///
/// Whether a resource cascades (has parent and sub-resources) is a
/// capability registered per class, see [`crate::graph::ResourceHierarchy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resource {
    /// A single entity instance
    Entity(EntityResource),
    /// All instances of a class
    Class(ClassResource),
}

impl Resource {
    /// Persisted entity resource
    pub fn entity(class: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Resource::Entity(EntityResource::new(class, id))
    }

    /// Class resource
    pub fn class(class: impl Into<String>) -> Self {
        Resource::Class(ClassResource::new(class))
    }

    /// Entity class of the resource
    pub fn class_name(&self) -> &str {
        match self {
            Resource::Entity(entity) => &entity.class,
            Resource::Class(class) => &class.class,
        }
    }

    /// Entity id stored on authorizations for this resource
    ///
    /// Class resources have no entity id. Unpersisted entities fail.
    pub fn entity_id(&self) -> Result<Option<&str>> {
        match self {
            Resource::Entity(entity) => entity.require_id().map(Some),
            Resource::Class(_) => Ok(None),
        }
    }
}

impl From<EntityResource> for Resource {
    fn from(entity: EntityResource) -> Self {
        Resource::Entity(entity)
    }
}

impl From<ClassResource> for Resource {
    fn from(class: ClassResource) -> Self {
        Resource::Class(class)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Entity(EntityResource { class, id: Some(id) }) => {
                write!(f, "entity:{}:{}", class, id)
            }
            Resource::Entity(EntityResource { class, id: None }) => write!(f, "entity:{}", class),
            Resource::Class(ClassResource { class }) => write!(f, "class:{}", class),
        }
    }
}

/// Parses descriptors of the form `entity:<Class>:<id>` and `class:<Class>`
impl FromStr for Resource {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let kind = parts.next().unwrap_or_default();
        let class = parts.next().filter(|class| !class.is_empty());
        let id = parts.next();

        match (kind, class, id) {
            ("entity", Some(class), Some(id)) if !id.is_empty() => Ok(Resource::entity(class, id)),
            ("entity", Some(class), None) => Ok(Resource::Entity(EntityResource::unpersisted(class))),
            ("class", Some(class), None) => Ok(Resource::class(class)),
            ("entity", _, _) | ("class", _, _) => Err(AclError::InvalidInput(format!(
                "Malformed resource descriptor '{}'",
                s
            ))),
            _ => Err(AclError::UnsupportedResource(s.to_string())),
        }
    }
}
