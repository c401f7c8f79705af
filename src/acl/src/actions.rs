//! Action sets: fixed-width sets of named boolean permissions
//!
//! An [`ActionSchema`] is the ordered list of action names known to a
//! deployment. It is chosen once at startup and every [`ActionSet`] carries
//! the schema it was built from, so two sets only combine when they agree on
//! the schema.

use crate::error::{AclError, Result};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Actions available when no schema override is configured
pub const DEFAULT_ACTIONS: &[&str] = &["view", "create", "edit", "delete", "undelete", "allow"];

/// Upper bound on the number of actions in a schema (one bit each)
pub const MAX_ACTIONS: usize = 64;

/// Action names become storage columns, so they are restricted to identifiers
const ACTION_NAME_PATTERN: &str = "^[a-z][a-z0-9_]*$";

/// Prefix of the per-action boolean columns in the authorization table
pub const ACTION_COLUMN_PREFIX: &str = "actions_";

/// Ordered, immutable list of action names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSchema {
    names: Arc<[String]>,
}

impl ActionSchema {
    /// Create a schema from a list of action names
    ///
    /// # Errors
    ///
    /// Returns [`AclError::InvalidInput`] if the list is empty, longer than
    /// [`MAX_ACTIONS`], contains duplicates, or contains a name that is not a
    /// lower-case identifier.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(AclError::InvalidInput(
                "Action schema must contain at least one action".to_string(),
            ));
        }
        if names.len() > MAX_ACTIONS {
            return Err(AclError::InvalidInput(format!(
                "Action schema supports at most {} actions, got {}",
                MAX_ACTIONS,
                names.len()
            )));
        }

        let pattern = Regex::new(ACTION_NAME_PATTERN)
            .map_err(|e| AclError::InvalidInput(format!("Invalid action pattern: {}", e)))?;

        for (i, name) in names.iter().enumerate() {
            if !pattern.is_match(name) {
                return Err(AclError::InvalidInput(format!(
                    "Invalid action name '{}': expected {}",
                    name, ACTION_NAME_PATTERN
                )));
            }
            if names[..i].contains(name) {
                return Err(AclError::InvalidInput(format!("Duplicate action name '{}'", name)));
            }
        }

        Ok(Self { names: names.into() })
    }

    /// Action names in schema order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of actions in the schema
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema is empty (never true for a constructed schema)
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of an action in the schema
    pub fn index_of(&self, action: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|name| name == action)
            .ok_or_else(|| AclError::UnknownAction(action.to_string()))
    }

    /// Storage column holding the flag of `action`
    pub fn column_name(&self, action: &str) -> Result<String> {
        self.index_of(action)?;
        Ok(format!("{}{}", ACTION_COLUMN_PREFIX, action))
    }

    /// Storage columns of every action, in schema order
    pub fn column_names(&self) -> Vec<String> {
        self.names
            .iter()
            .map(|name| format!("{}{}", ACTION_COLUMN_PREFIX, name))
            .collect()
    }

    /// Action set with no action granted
    pub fn none(&self) -> ActionSet {
        ActionSet {
            schema: self.clone(),
            bits: 0,
        }
    }

    /// Action set with every action granted
    pub fn all(&self) -> ActionSet {
        let bits = if self.len() == MAX_ACTIONS {
            u64::MAX
        } else {
            (1u64 << self.len()) - 1
        };
        ActionSet {
            schema: self.clone(),
            bits,
        }
    }

    /// Action set granting exactly the named actions
    pub fn actions<S: AsRef<str>>(&self, granted: &[S]) -> Result<ActionSet> {
        let mut bits = 0u64;
        for action in granted {
            bits |= 1 << self.index_of(action.as_ref())?;
        }
        Ok(ActionSet {
            schema: self.clone(),
            bits,
        })
    }

    /// Action set from one flag per action, in schema order
    pub fn from_flags(&self, flags: &[bool]) -> Result<ActionSet> {
        if flags.len() != self.len() {
            return Err(AclError::SchemaMismatch(format!(
                "expected {} action flags, got {}",
                self.len(),
                flags.len()
            )));
        }
        let bits = flags
            .iter()
            .enumerate()
            .filter(|(_, granted)| **granted)
            .fold(0u64, |acc, (i, _)| acc | (1 << i));
        Ok(ActionSet {
            schema: self.clone(),
            bits,
        })
    }
}

impl Default for ActionSchema {
    fn default() -> Self {
        Self {
            names: DEFAULT_ACTIONS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// Immutable set of granted actions
///
/// Equality is flag-wise (and schema-wise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    schema: ActionSchema,
    bits: u64,
}

impl ActionSet {
    /// Schema this set was built from
    pub fn schema(&self) -> &ActionSchema {
        &self.schema
    }

    /// Whether `action` is granted
    ///
    /// # Errors
    ///
    /// [`AclError::UnknownAction`] if the action is not part of the schema.
    pub fn is_allowed(&self, action: &str) -> Result<bool> {
        let index = self.schema.index_of(action)?;
        Ok(self.bits & (1 << index) != 0)
    }

    /// Copy of this set with `action` granted as well
    pub fn with(&self, action: &str) -> Result<ActionSet> {
        let index = self.schema.index_of(action)?;
        Ok(ActionSet {
            schema: self.schema.clone(),
            bits: self.bits | (1 << index),
        })
    }

    /// Logical OR of two action sets
    pub fn merge(&self, other: &ActionSet) -> Result<ActionSet> {
        if self.schema != other.schema {
            return Err(AclError::SchemaMismatch(format!(
                "cannot merge [{}] with [{}]",
                self.schema.names().join(", "),
                other.schema.names().join(", ")
            )));
        }
        Ok(ActionSet {
            schema: self.schema.clone(),
            bits: self.bits | other.bits,
        })
    }

    /// One flag per action, in schema order
    pub fn flags(&self) -> Vec<bool> {
        (0..self.schema.len())
            .map(|i| self.bits & (1 << i) != 0)
            .collect()
    }

    /// Names of the granted actions, in schema order
    pub fn granted(&self) -> Vec<&str> {
        self.schema
            .names()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bits & (1 << i) != 0)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Whether no action is granted
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.granted().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ActionSchema {
        ActionSchema::new(["read", "write", "delete"]).unwrap()
    }

    #[test]
    fn test_default_schema() {
        let schema = ActionSchema::default();
        assert_eq!(schema.len(), 6);
        assert_eq!(schema.index_of("view").unwrap(), 0);
        assert_eq!(schema.index_of("allow").unwrap(), 5);
    }

    #[test]
    fn test_schema_validation() {
        assert!(ActionSchema::new(Vec::<String>::new()).is_err());
        assert!(ActionSchema::new(["read", "read"]).is_err());
        assert!(ActionSchema::new(["Read"]).is_err());
        assert!(ActionSchema::new(["read; drop table"]).is_err());
        assert!(ActionSchema::new((0..65).map(|i| format!("a{}", i))).is_err());
        assert!(ActionSchema::new((0..64).map(|i| format!("a{}", i))).is_ok());
    }

    #[test]
    fn test_action_set_flags() {
        let set = schema().actions(&["read", "write"]).unwrap();

        assert!(set.is_allowed("read").unwrap());
        assert!(set.is_allowed("write").unwrap());
        assert!(!set.is_allowed("delete").unwrap());
        assert!(matches!(set.is_allowed("fly"), Err(AclError::UnknownAction(_))));
        assert_eq!(set.flags(), vec![true, true, false]);
        assert_eq!(set.to_string(), "{read, write}");
    }

    #[test]
    fn test_merge_is_logical_or() {
        let schema = schema();
        let read = schema.actions(&["read"]).unwrap();
        let delete = schema.actions(&["delete"]).unwrap();

        let merged = read.merge(&delete).unwrap();
        assert_eq!(merged.granted(), vec!["read", "delete"]);
        assert_eq!(merged, schema.actions(&["delete", "read"]).unwrap());

        let other = ActionSchema::default().all();
        assert!(matches!(read.merge(&other), Err(AclError::SchemaMismatch(_))));
    }

    #[test]
    fn test_all_and_none() {
        let schema = schema();
        assert!(schema.none().is_empty());
        assert_eq!(schema.all().granted(), vec!["read", "write", "delete"]);

        let wide = ActionSchema::new((0..64).map(|i| format!("a{}", i))).unwrap();
        assert_eq!(wide.all().granted().len(), 64);
    }

    #[test]
    fn test_from_flags() {
        let schema = schema();
        let set = schema.from_flags(&[false, true, true]).unwrap();
        assert_eq!(set.granted(), vec!["write", "delete"]);
        assert!(schema.from_flags(&[true]).is_err());
    }

    #[test]
    fn test_column_names() {
        let schema = schema();
        assert_eq!(schema.column_name("write").unwrap(), "actions_write");
        assert_eq!(
            schema.column_names(),
            vec!["actions_read", "actions_write", "actions_delete"]
        );
    }
}
