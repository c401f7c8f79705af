//! Materialized authorizations and the batches they are written in
//!
//! Authorizations form a tree per root grant through their parent link. In
//! memory the tree is an arena: an [`AuthorizationBatch`] owns the records and
//! a child refers to its parent either by slot in the same batch or by the id
//! of an authorization that is already persisted. Ids are assigned by the
//! store while the batch is written, so a parent slot must come before its
//! children.

use crate::actions::ActionSet;
use crate::error::{AclError, Result};
use crate::resource::{ClassResource, EntityId, EntityResource, Resource};
use crate::role::{Role, RoleId};
use std::ops::Range;

/// Unique authorization identifier, assigned by the store
pub type AuthorizationId = i64;

/// Location of a parent authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// Earlier slot of the same batch
    Batch(usize),
    /// Authorization already written to the store
    Persisted(AuthorizationId),
}

impl ParentRef {
    /// Reference to a persisted authorization, `None` if it has no id yet
    pub fn of(authorization: &Authorization) -> Option<ParentRef> {
        authorization.id.map(ParentRef::Persisted)
    }
}

/// A materialized permission of a role on a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    /// Id, `None` until written by the store
    pub id: Option<AuthorizationId>,

    /// Owning role
    pub role_id: RoleId,

    /// Copy of the role's security identity (saves a join when checking)
    pub security_identity: String,

    /// Granted actions
    pub actions: ActionSet,

    /// Class of the resource
    pub entity_class: String,

    /// Entity id, `None` for class resources
    pub entity_id: Option<EntityId>,

    /// Whether the authorization propagates to resources created later
    pub cascadable: bool,

    /// Parent authorization, `None` for a root (direct grant)
    pub parent: Option<ParentRef>,
}

impl Authorization {
    /// Root authorization of `role` on `resource`
    ///
    /// # Errors
    ///
    /// - [`AclError::UnpersistedRole`] if the role has no id
    /// - [`AclError::UnpersistedResource`] for an entity without id
    pub fn create(role: &Role, actions: ActionSet, resource: &Resource, cascadable: bool) -> Result<Self> {
        let role_id = role.require_id()?;
        let entity_id = resource.entity_id()?.map(str::to_string);

        Ok(Self {
            id: None,
            role_id,
            security_identity: role.security_identity.clone(),
            actions,
            entity_class: resource.class_name().to_string(),
            entity_id,
            cascadable,
            parent: None,
        })
    }

    /// Child of this authorization on `resource`
    ///
    /// Role, identity, actions and the cascadable flag are copied from `self`.
    /// `parent` locates `self`: its slot in the batch being built, or its id
    /// when it is already persisted.
    pub fn create_child_authorization(&self, parent: ParentRef, resource: &Resource) -> Result<Self> {
        let entity_id = resource.entity_id()?.map(str::to_string);

        Ok(Self {
            id: None,
            role_id: self.role_id,
            security_identity: self.security_identity.clone(),
            actions: self.actions.clone(),
            entity_class: resource.class_name().to_string(),
            entity_id,
            cascadable: self.cascadable,
            parent: Some(parent),
        })
    }

    /// Whether this is a direct grant rather than a cascaded one
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Resource the authorization applies to
    pub fn resource(&self) -> Resource {
        match &self.entity_id {
            Some(id) => Resource::Entity(EntityResource::new(self.entity_class.clone(), id.clone())),
            None => Resource::Class(ClassResource::new(self.entity_class.clone())),
        }
    }

    /// Whether the authorization is scoped to exactly `resource`
    pub fn applies_to(&self, resource: &Resource) -> bool {
        if self.entity_class != resource.class_name() {
            return false;
        }
        match resource {
            Resource::Entity(entity) => entity.id.is_some() && self.entity_id == entity.id,
            Resource::Class(_) => self.entity_id.is_none(),
        }
    }
}

/// Ordered authorizations written together by the store
#[derive(Debug, Clone, Default)]
pub struct AuthorizationBatch {
    entries: Vec<Authorization>,
}

impl AuthorizationBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an authorization, returning its slot
    pub fn push(&mut self, authorization: Authorization) -> usize {
        self.entries.push(authorization);
        self.entries.len() - 1
    }

    /// Number of authorizations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Authorization in a slot
    pub fn get(&self, index: usize) -> Option<&Authorization> {
        self.entries.get(index)
    }

    /// Iterate in write order
    pub fn iter(&self) -> std::slice::Iter<'_, Authorization> {
        self.entries.iter()
    }

    /// Consume the batch
    pub fn into_vec(self) -> Vec<Authorization> {
        self.entries
    }

    /// Id of the parent of the authorization in `index`
    ///
    /// # Errors
    ///
    /// [`AclError::DanglingParent`] if the parent is a slot that is not
    /// strictly before `index` or that has not been written yet.
    pub fn resolve_parent(&self, index: usize) -> Result<Option<AuthorizationId>> {
        let Some(entry) = self.entries.get(index) else {
            return Err(AclError::InvalidInput(format!("No authorization in slot {}", index)));
        };

        match entry.parent {
            None => Ok(None),
            Some(ParentRef::Persisted(id)) => Ok(Some(id)),
            Some(ParentRef::Batch(slot)) if slot < index => self.entries[slot]
                .id
                .map(Some)
                .ok_or(AclError::DanglingParent { index }),
            Some(ParentRef::Batch(_)) => Err(AclError::DanglingParent { index }),
        }
    }

    /// Record the id the store generated for a slot
    pub(crate) fn set_id(&mut self, index: usize, id: Option<AuthorizationId>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.id = id;
        }
    }

    /// Forget the ids of slots whose transaction did not commit
    pub(crate) fn clear_ids(&mut self, slots: Range<usize>) {
        for index in slots {
            self.set_id(index, None);
        }
    }
}

impl FromIterator<Authorization> for AuthorizationBatch {
    fn from_iter<I: IntoIterator<Item = Authorization>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<Authorization> for AuthorizationBatch {
    fn extend<I: IntoIterator<Item = Authorization>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> IntoIterator for &'a AuthorizationBatch {
    type Item = &'a Authorization;
    type IntoIter = std::slice::Iter<'a, Authorization>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
