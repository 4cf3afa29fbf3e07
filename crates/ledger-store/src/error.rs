use thiserror::Error;
use uuid::Uuid;

use crate::Version;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write named a version that is no longer current.
    #[error("Concurrency conflict for {kind} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        kind: String,
        id: Uuid,
        expected: Version,
        actual: Version,
    },

    /// An insert targeted a document that already exists.
    #[error("Document already exists: {kind} {id}")]
    AlreadyExists { kind: String, id: Uuid },

    /// An update or delete targeted a document that does not exist.
    #[error("Document not found: {kind} {id}")]
    DocumentNotFound { kind: String, id: Uuid },

    /// The batch itself is malformed.
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors caused by a concurrent writer winning the race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
