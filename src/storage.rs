//! Local Persistence
//!
//! Durable fallback for snapshots that could not be delivered, plus the
//! plaintext operator log:
//! - **Writer**: Dedicated thread with exclusive file access, fed by an MPSC channel
//! - **Facade**: Cloneable async handle used by the collection loop
//!
//! # Components
//!
//! - [`StorageWriter`]: Save records, append log lines, list saved files
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management
//! - [`RecordKind`]: Metrics snapshot or error-log record

mod actor;
mod builder;
mod error;
mod facades;
mod types;

pub use builder::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOGS_DIR, DEFAULT_METRICS_DIR, StorageBuilder,
    StorageHandles,
};
pub use error::StorageError;
pub use facades::StorageWriter;
pub use types::{RecordKind, format_log_line, log_file_name, metrics_file_name};
