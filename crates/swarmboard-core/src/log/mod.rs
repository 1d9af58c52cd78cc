//! Append-only checkpoint log abstraction.

mod file;
mod memory;

pub use file::FileLog;
pub use memory::MemoryLog;

use crate::checkpoint::CheckpointRecord;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Log errors.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Record not found at index {0}")]
    NotFound(u64),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Log error: {0}")]
    Other(String),
}

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Boxed future for async log operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for append-only checkpoint log backends.
///
/// Records are never overwritten or deleted; recovery is a replay of
/// what was appended. Implementations can keep the log in memory or on
/// the filesystem.
pub trait CheckpointLog: Send + Sync {
    /// Append a record, returning its index.
    fn append(&self, record: &CheckpointRecord) -> BoxFuture<'_, LogResult<u64>>;

    /// Read the record at the given index.
    fn get(&self, index: u64) -> BoxFuture<'_, LogResult<CheckpointRecord>>;

    /// Number of records appended so far.
    fn len(&self) -> BoxFuture<'_, LogResult<u64>>;
}
