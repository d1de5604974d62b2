//! Database error types.

use scour_types::{DatasetId, IteratorId, TaskId};
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors from database and snapshot operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Commit referenced a task id not in the registry.
    #[error("no live task with id {0}")]
    UnknownTask(TaskId),

    /// A command referenced a dataset the snapshot does not contain.
    #[error("dataset {0} does not exist")]
    UnknownDataset(DatasetId),

    /// A command referenced an iterator that does not exist on disk.
    #[error("iterator {0} does not exist")]
    UnknownIterator(IteratorId),

    /// Unknown configuration key name.
    #[error("unknown config key {0:?}")]
    UnknownConfigKey(String),

    /// Configuration value outside the key's allowed range.
    #[error("value {value} out of range for config key {key}")]
    ConfigValueOutOfRange { key: String, value: u64 },

    /// Index layer failure (build, load, query or iterator I/O).
    #[error(transparent)]
    Index(#[from] scour_index::IndexError),

    /// I/O error outside the index layer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
