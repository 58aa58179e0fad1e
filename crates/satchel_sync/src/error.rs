//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote endpoint operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A failure reported by the remote endpoint.
///
/// The endpoint collapses every non-success outcome (transport failure,
/// non-2xx response, timeout) into one of these; the engine converts them
/// into offline-queue entries rather than propagating them.
#[derive(Debug, Clone, Error)]
#[error("remote error: {message}")]
pub struct RemoteError {
    /// Description of the failure.
    pub message: String,
    /// Whether retrying the operation can succeed.
    pub retryable: bool,
}

impl RemoteError {
    /// Creates a retryable remote error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Errors that can occur in sync operations.
///
/// Note that [`crate::SyncEngine::sync`] itself never returns these; they
/// surface from queue and conflict management calls.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store error while persisting queue entries or records.
    #[error("store error: {0}")]
    Store(#[from] satchel_store::StoreError),

    /// Manual resolution targeted a conflict that does not exist.
    #[error("conflict not found: {id}")]
    ConflictNotFound {
        /// The conflict (record) id.
        id: String,
    },

    /// A persisted conflict record no longer deserializes.
    #[error("malformed conflict record {id}: {message}")]
    MalformedConflict {
        /// The conflict (record) id.
        id: String,
        /// Description of the problem.
        message: String,
    },
}
