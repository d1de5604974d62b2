//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur during wire protocol operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// Invalid magic bytes in frame header.
    #[error("invalid magic: expected 0x53435257, got 0x{0:08x}")]
    InvalidMagic(u32),

    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown frame kind byte.
    #[error("unknown frame kind: {0}")]
    UnknownFrameKind(u8),

    /// Frame body exceeds the maximum size.
    #[error("frame body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: u32, max: u32 },

    /// Checksum mismatch.
    #[error("checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The envelope's part count disagrees with the decoded body.
    #[error("frame declares {declared} parts, body decodes to {actual}")]
    PartCountMismatch { declared: usize, actual: usize },

    /// A multipart part length points past the end of the body.
    #[error("truncated multipart body")]
    TruncatedPart,

    /// Expected a zero-size separator part.
    #[error("expected zero-size separator frame")]
    MissingSeparator,

    /// A message did not have the parts its shape requires.
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// Unknown action tag byte.
    #[error("unknown action tag: {0}")]
    UnknownAction(u8),

    /// Unknown lock reply byte.
    #[error("unknown lock reply: {0}")]
    UnknownLockReply(u8),

    /// A text field was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
