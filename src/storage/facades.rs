//! User-facing storage facade.
//!
//! [`StorageWriter`] is cheap to clone and never blocks the async runtime:
//! commands are queued with `try_send`, and replies arrive over a oneshot
//! channel that is awaited.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};

use tokio::sync::oneshot;

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::types::RecordKind;

/// Non-blocking storage writer.
///
/// Log lines are fire-and-forget and dropped (and counted) when the channel
/// is full. Saves report their outcome to the caller.
#[derive(Clone)]
pub struct StorageWriter {
    tx: SyncSender<Command>,
    dropped_logs: Arc<AtomicU64>,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter")
            .field("dropped_logs", &self.dropped_logs())
            .finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(tx: SyncSender<Command>) -> Self {
        Self {
            tx,
            dropped_logs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total log lines dropped due to channel capacity.
    pub fn dropped_logs(&self) -> u64 {
        self.dropped_logs.load(Ordering::Relaxed)
    }

    /// Persist a record and return the path it was written to.
    ///
    /// Metrics records land in their own file; error-log records are appended
    /// to the daily log file, whose path is returned.
    pub async fn save(&self, bytes: Vec<u8>, kind: RecordKind) -> Result<PathBuf, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Save { kind, bytes, reply })?;
        rx.await.map_err(|_| StorageError::ReplyDropped)?
    }

    /// Append a `[HH:MM:SS] message` line to the durable log.
    pub fn append_log(&self, message: impl Into<String>) -> Result<(), StorageError> {
        self.send(Command::AppendLog(message.into())).inspect_err(|_| {
            self.dropped_logs.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// List files written for `kind`, sorted by name (and therefore by time).
    pub async fn list(&self, kind: RecordKind) -> Result<Vec<PathBuf>, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::List { kind, reply })?;
        rx.await.map_err(|_| StorageError::ReplyDropped)?
    }

    pub(crate) fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .map_err(|_| StorageError::ChannelSend)
    }

    fn send(&self, cmd: Command) -> Result<(), StorageError> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Storage channel full");
                Err(StorageError::ChannelSend)
            }
            Err(TrySendError::Disconnected(_)) => Err(StorageError::ChannelSend),
        }
    }
}
