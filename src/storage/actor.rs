//! Writer actor with a dedicated thread and MPSC channel.
//!
//! Single-writer pattern: one thread owns every file handle and processes
//! commands in arrival order, so snapshot files and log lines never interleave.
//! Every write is flushed and closed before the reply is sent.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use chrono::Local;
use tokio::sync::oneshot;

use crate::storage::StorageError;
use crate::storage::types::{RecordKind, format_log_line, log_file_name, metrics_file_name};

// =============================================================================
// Constants
// =============================================================================

/// Upper bound on name disambiguation attempts within one millisecond.
const MAX_NAME_ATTEMPTS: u32 = 1_000;

// =============================================================================
// Commands
// =============================================================================

/// Reply channel for commands that report a result.
pub type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Persist a record and reply with the file it landed in.
    Save {
        kind: RecordKind,
        bytes: Vec<u8>,
        reply: Reply<PathBuf>,
    },
    /// Append a log line (fire-and-forget).
    AppendLog(String),
    /// List files previously written for a record kind.
    List {
        kind: RecordKind,
        reply: Reply<Vec<PathBuf>>,
    },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Directory layout owned by the actor.
#[derive(Debug, Clone)]
pub struct Layout {
    pub metrics_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Layout {
    fn dir(&self, kind: RecordKind) -> &Path {
        match kind {
            RecordKind::Metrics => &self.metrics_dir,
            RecordKind::ErrorLog => &self.logs_dir,
        }
    }
}

/// File writer actor.
pub struct FileActor {
    layout: Layout,
    rx: Receiver<Command>,
}

impl FileActor {
    /// Create both directories and spawn the writer thread.
    pub fn spawn(
        layout: Layout,
        channel_capacity: usize,
    ) -> Result<(JoinHandle<()>, SyncSender<Command>), StorageError> {
        ensure_dir(&layout.metrics_dir)?;
        ensure_dir(&layout.logs_dir)?;

        let (tx, rx) = mpsc::sync_channel(channel_capacity);
        let mut actor = FileActor { layout, rx };
        let handle = thread::Builder::new()
            .name("storage-writer".to_string())
            .spawn(move || actor.run())
            .map_err(|e| StorageError::Internal(format!("failed to spawn writer thread: {e}")))?;

        Ok((handle, tx))
    }

    fn run(&mut self) {
        tracing::info!(
            metrics_dir = %self.layout.metrics_dir.display(),
            logs_dir = %self.layout.logs_dir.display(),
            "FileActor started"
        );

        while let Ok(cmd) = self.rx.recv() {
            if self.handle_command(cmd) {
                break;
            }
        }

        tracing::info!("FileActor stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Save { kind, bytes, reply } => {
                let result = match kind {
                    RecordKind::Metrics => self.write_metrics(&bytes),
                    RecordKind::ErrorLog => {
                        self.append_log(&String::from_utf8_lossy(&bytes))
                    }
                };
                if let Err(e) = &result {
                    tracing::error!(kind = %kind, error = %e, "Save failed");
                }
                // Caller may have given up waiting; nothing to do then.
                let _ = reply.send(result);
            }
            Command::AppendLog(message) => {
                if let Err(e) = self.append_log(&message) {
                    tracing::error!(error = %e, "Log append failed");
                }
            }
            Command::List { kind, reply } => {
                let _ = reply.send(list_files(self.layout.dir(kind)));
            }
            Command::Shutdown => {
                tracing::info!("FileActor shutting down");
                return true;
            }
        }
        false
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Write one snapshot into a fresh file.
    ///
    /// Names carry millisecond resolution; if a name is still taken, a numeric
    /// suffix is added instead of overwriting.
    fn write_metrics(&self, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let dir = &self.layout.metrics_dir;
        ensure_dir(dir)?;

        let now = Local::now();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(metrics_file_name(&now, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    write_and_sync(file, bytes).map_err(|e| StorageError::io(&path, e))?;
                    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }

        Err(StorageError::Internal(format!(
            "no free metrics file name after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    /// Append one `[HH:MM:SS] message` line to today's log file.
    fn append_log(&self, message: &str) -> Result<PathBuf, StorageError> {
        let dir = &self.layout.logs_dir;
        ensure_dir(dir)?;

        let now = Local::now();
        let path = dir.join(log_file_name(&now));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;
        write_and_sync(file, format_log_line(&now, message).as_bytes())
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(path)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))
}

fn write_and_sync(mut file: File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StorageError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
