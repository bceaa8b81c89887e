//! Error types for schema diffing and migration planning.

/// Errors that can occur while diffing, ordering, rendering or applying
/// schema changes.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The operations of a changeset depend on each other in a cycle.
    #[error("Circular dependency detected while ordering '{operation}'")]
    CircularDependency {
        /// Description of the operation that was revisited.
        operation: String,
    },

    /// More than one current object is an equally valid rename source.
    #[error("Ambiguous rename for '{target}' in '{table}': candidates {}", .candidates.join(", "))]
    AmbiguousRename {
        /// Table the rename was detected in (or the schema for table renames).
        table: String,
        /// The target object that has no name match.
        target: String,
        /// Every current object that could have been renamed to `target`.
        candidates: Vec<String>,
    },

    /// The dialect has no way to express the operation.
    #[error("Operation {operation} is not supported by the {dialect} dialect")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Operation variant name.
        operation: &'static str,
    },

    /// An operation cannot be applied to the schema it was given.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// The inspector read something it cannot map onto the schema model.
    #[error("Inspection failed: {0}")]
    Inspect(String),

    /// Database error during inspection or execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement failed while a changeset was being applied.
    #[error("Statement failed: {sql}: {source}")]
    Statement {
        /// The SQL text that failed.
        sql: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// IO error (reading/writing schema files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
