//! Error types for schema reconciliation.

use std::path::PathBuf;

/// Errors that can occur while reconciling the declared schema with the
/// live database.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The registered model is inconsistent (missing inverse relation,
    /// ambiguous join table ownership, empty table, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The live catalog returned something the engine cannot diff against.
    #[error("Introspection error on table '{table}': {message}")]
    Introspection {
        /// Table being introspected.
        table: String,
        /// What was wrong with the catalog data.
        message: String,
    },

    /// A single generated statement failed to apply.
    #[error("Statement failed on table '{table}': {sql} ({message})")]
    Apply {
        /// Table the statement belongs to.
        table: String,
        /// The exact SQL that failed.
        sql: String,
        /// Driver error message.
        message: String,
    },

    /// A migration artifact could not be written.
    #[error("Failed to write migration artifact '{path}': {source}")]
    ArtifactWrite {
        /// Artifact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading artifacts or configuration).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Shorthand for a [`ReconcileError::Configuration`].
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a [`ReconcileError::Introspection`].
    pub(crate) fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wraps the failure of one statement into a [`ReconcileError::Apply`].
    pub(crate) fn apply(table: &str, sql: &str, cause: &Self) -> Self {
        Self::Apply {
            table: table.to_string(),
            sql: sql.to_string(),
            message: cause.to_string(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
