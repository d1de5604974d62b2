//! Query language error types.

use thiserror::Error;

/// Result type for query parsing.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors produced while parsing a query expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The input ended in the middle of an expression.
    #[error("unexpected end of query")]
    UnexpectedEnd,

    /// A character that starts no token.
    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),

    /// A token that is valid somewhere, but not here.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    /// Invalid escape sequence inside a quoted literal.
    #[error("invalid escape sequence in literal: {0}")]
    BadEscape(String),

    /// Invalid digit inside a `{..}` hex string.
    #[error("invalid hex string: {0}")]
    BadHex(String),

    /// A literal too short to derive any n-gram from.
    #[error("literal {0:?} is shorter than 3 bytes")]
    LiteralTooShort(String),

    /// `min N of (...)` with a count that can never be satisfied.
    #[error("min {needed} of {available} subqueries can never match")]
    BadMinCount { needed: usize, available: usize },
}
