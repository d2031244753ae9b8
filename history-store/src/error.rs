//! Error types for the history store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// History store errors
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema version recorded in the store does not match this build
    #[error("Schema version mismatch: store has {found}, expected {expected}")]
    SchemaVersion {
        /// Version this build writes
        expected: u32,
        /// Version found in the store
        found: u32,
    },

    /// Surrogate-id resolution left a natural key unresolved
    #[error("No internal id resolved for natural key {0}")]
    UnresolvedKey(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
