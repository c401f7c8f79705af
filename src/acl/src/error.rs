//! Error types for the access control engine

use thiserror::Error;

/// Access control errors
///
/// None of these are retried internally. A failed write must be treated as
/// "authorization state may be partially applied" and the whole logical
/// operation retried by the caller.
#[derive(Debug, Error)]
pub enum AclError {
    /// An entity resource without an id was used where an id is required
    #[error("The entity resource {0} must be persisted (id not null)")]
    UnpersistedResource(String),

    /// A resource descriptor named a variant the engine does not know
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// A child authorization reached the store before its parent had an id
    #[error(
        "Authorization #{index} has a parent with no id; parent authorizations must appear \
         before their children so they are persisted first"
    )]
    DanglingParent {
        /// Position of the offending authorization in the batch
        index: usize,
    },

    /// Query augmentation without a resolvable target entity or alias
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// Required startup registration is missing
    #[error("Misconfigured engine: {0}")]
    MisconfiguredEngine(String),

    /// Action name outside of the configured schema
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Two action sets built from different schemas were combined
    #[error("Action schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Authorizations were requested from a role that was never persisted
    #[error("Role {0} must be persisted before creating authorizations")]
    UnpersistedRole(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Settings or attribute (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for access control operations
pub type Result<T> = std::result::Result<T, AclError>;
