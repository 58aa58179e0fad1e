//! Error types for backend operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the backend directory lock.
    #[error("backend locked: another process has exclusive access to {path:?}")]
    Locked {
        /// The locked directory.
        path: PathBuf,
    },

    /// The on-disk data is corrupted.
    #[error("backend corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Neither the primary nor the fallback backend could be opened.
    #[error("no usable backend: {message}")]
    Unavailable {
        /// Description of both probe failures.
        message: String,
    },
}

impl BackendError {
    /// Creates a corrupted error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
