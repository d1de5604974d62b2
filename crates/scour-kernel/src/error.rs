//! Command layer error types.

use thiserror::Error;

/// Result type for command parsing and execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Recoverable failures while handling one command.
///
/// Every variant becomes a `Response::error` in `dispatch_safe`; none of
/// them tears down the worker.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The request line does not parse as a command.
    #[error("parse error: {0}")]
    Parse(String),

    /// The embedded query expression does not parse.
    #[error("query error: {0}")]
    Query(#[from] scour_query::QueryError),

    /// Snapshot or database operation failed (unknown dataset or
    /// iterator, index I/O, allocation failure while collecting results).
    #[error(transparent)]
    Db(#[from] scour_db::DbError),
}
