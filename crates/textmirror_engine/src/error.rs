//! Error types for the sync engine.

use std::path::PathBuf;
use textmirror_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while mirroring a document.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote origin answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// An update could not be decoded or applied.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Reading or writing the mirrored file failed.
    #[error("persistence error at {}: {source}", path.display())]
    Persistence {
        /// The mirrored file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The local document store rejected an operation.
    #[error("document store error: {0}")]
    Store(String),

    /// A document identifier cannot be mapped to a mirror path.
    #[error("invalid document id {0:?}")]
    InvalidDocumentId(String),

    /// A pin index could not be read.
    #[error("invalid pin index: {0}")]
    InvalidIndex(String),

    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last_error: String,
    },

    /// The operation was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a persistence error for `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the transport expects a retry to succeed.
    ///
    /// Every non-success status counts as transient. Sends are retried
    /// regardless; the flag is reported in retry logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Status(_) => true,
            _ => false,
        }
    }
}
