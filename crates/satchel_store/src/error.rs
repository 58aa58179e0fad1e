//! Error types for the record store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[from] satchel_backend::BackendError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] satchel_codec::CodecError),

    /// Update target does not exist.
    #[error("record not found: {id} in {collection}")]
    NotFound {
        /// The collection searched.
        collection: String,
        /// The record id that was not found.
        id: String,
    },

    /// The record is not storable (e.g. missing its `id` field).
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A backup blob could not be restored. Nothing was modified.
    #[error("restore failed: {message}")]
    Restore {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a restore error.
    pub fn restore(message: impl Into<String>) -> Self {
        Self::Restore {
            message: message.into(),
        }
    }
}
