//! Index layer error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors from building, loading or querying index artifacts.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid magic bytes in an index file header.
    #[error("invalid index magic: expected 0x53434958, got 0x{0:08x}")]
    InvalidMagic(u32),

    /// Unsupported index file version.
    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u16),

    /// Unknown index kind byte.
    #[error("unknown index kind byte: {0}")]
    UnknownKind(u8),

    /// The index file is shorter than its header demands.
    #[error("truncated index file: {0}")]
    Truncated(PathBuf),

    /// CRC mismatch on an index file.
    #[error("corrupted index file {path}: expected crc 0x{expected:08x}, got 0x{actual:08x}")]
    Corrupted {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    /// Manifest or meta file failed to decode.
    #[error("decode error in {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The iterator has no entry at the requested position.
    #[error("iterator {0} not found")]
    IteratorNotFound(String),

    /// Datasets with differing index kind sets cannot be merged.
    #[error("datasets have incompatible index kinds and cannot be merged")]
    IncompatibleIndexes,

    /// Allocation failed while accumulating results.
    #[error("out of memory")]
    OutOfMemory,

    /// I/O error with the path that produced it.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    /// Attaches a path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
