//! Storage error handling

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing a storage medium
#[derive(Error, Debug)]
pub enum StorageError {
    /// The directory holding the database could not be created
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored value under a key is not valid JSON
    #[error("Invalid value stored under '{key}': {details}")]
    InvalidValue { key: String, details: String },

    /// The medium refuses writes, e.g. a quota was hit
    #[error("Write to '{key}' rejected: {reason}")]
    Rejected { key: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// The storage key this error concerns, when known
    pub fn key(&self) -> Option<&str> {
        match self {
            StorageError::InvalidValue { key, .. } | StorageError::Rejected { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }

    /// Whether the stored bytes are unreadable
    ///
    /// Such a value is treated as absent and replaced on the next write.
    pub fn is_corrupt_value(&self) -> bool {
        matches!(self, StorageError::InvalidValue { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
