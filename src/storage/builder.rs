//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the persistence layer and a
//! handles struct owning the writer thread.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::storage::StorageError;
use crate::storage::StorageWriter;
use crate::storage::actor::{FileActor, Layout};

/// Default channel capacity for writer commands.
///
/// At one snapshot and a handful of log lines per tick this covers minutes of
/// backlog if the disk stalls.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

/// Default directory for serialized snapshots, relative to the root.
pub const DEFAULT_METRICS_DIR: &str = "metrics_data";

/// Default directory for daily log files, relative to the root.
pub const DEFAULT_LOGS_DIR: &str = "logs";

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    root: PathBuf,
    metrics_dir: String,
    logs_dir: String,
    channel_capacity: usize,
}

impl StorageBuilder {
    /// Create a new storage builder rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            metrics_dir: DEFAULT_METRICS_DIR.to_string(),
            logs_dir: DEFAULT_LOGS_DIR.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the snapshot directory name.
    pub fn metrics_dir(mut self, dir: impl Into<String>) -> Self {
        self.metrics_dir = dir.into();
        self
    }

    /// Set the log directory name.
    pub fn logs_dir(mut self, dir: impl Into<String>) -> Self {
        self.logs_dir = dir.into();
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the storage layer and return handles.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        if self.channel_capacity == 0 {
            return Err(StorageError::Internal(
                "channel capacity must be positive".to_string(),
            ));
        }

        let layout = Layout {
            metrics_dir: self.root.join(&self.metrics_dir),
            logs_dir: self.root.join(&self.logs_dir),
        };
        let (actor_handle, tx) = FileActor::spawn(layout.clone(), self.channel_capacity)?;

        tracing::info!(root = %self.root.display(), "Storage initialized");

        Ok(StorageHandles {
            writer: StorageWriter::new(tx),
            metrics_dir: layout.metrics_dir,
            logs_dir: layout.logs_dir,
            actor_handle,
        })
    }
}

/// Handles to the storage layer.
#[derive(Debug)]
pub struct StorageHandles {
    /// Write facade, cloneable.
    pub writer: StorageWriter,
    /// Resolved snapshot directory.
    pub metrics_dir: PathBuf,
    /// Resolved log directory.
    pub logs_dir: PathBuf,
    actor_handle: JoinHandle<()>,
}

impl StorageHandles {
    /// Stop the writer thread after it drains queued commands.
    pub fn shutdown(self) -> Result<(), StorageError> {
        self.writer.shutdown()?;
        self.actor_handle
            .join()
            .map_err(|_| StorageError::Internal("writer thread panicked".to_string()))
    }
}
