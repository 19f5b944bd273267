//! Storage-specific error types.
//!
//! All persistence operations return [`StorageError`] on failure. Callers log
//! and surface it; a failed write never stops the collection loop.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the local persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to send command to writer actor (channel full or closed).
    #[error("failed to send command to writer actor")]
    ChannelSend,

    /// Writer actor dropped the reply without answering.
    #[error("writer actor stopped before replying")]
    ReplyDropped,

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
