//! Broker error types.

use scour_types::WorkerId;
use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors in the coordinator loop and its transports.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A backend or frontend message failed to decode.
    #[error(transparent)]
    Wire(#[from] scour_wire::WireError),

    /// Database operation failed during commit.
    #[error(transparent)]
    Db(#[from] scour_db::DbError),

    /// A worker's dispatch channel is gone (its thread died).
    #[error("worker {0} is gone")]
    WorkerGone(WorkerId),

    /// Every worker hung up; the pool is unrecoverable.
    #[error("backend channel disconnected")]
    BackendClosed,

    /// Transport I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
