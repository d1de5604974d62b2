//! # scour-types: Core types for `Scour`
//!
//! This crate contains shared types used across the `Scour` system:
//! - Entity IDs ([`TaskId`], [`DatasetId`], [`IteratorId`], [`WorkerId`])
//! - Client addresses ([`ConnId`])
//! - Index classification ([`IndexKind`])
//! - Task display form ([`TaskSpec`])

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs
// ============================================================================

/// Unique identifier for an in-flight task.
///
/// Task ids are allocated monotonically by the database and never reused
/// within a process lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Stable identifier for an immutable dataset (`set_xxxxxxxx`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DatasetId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for DatasetId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Stable identifier for a persisted result iterator (`iter_xxxxxxxx`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IteratorId(String);

impl IteratorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IteratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IteratorId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for IteratorId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Stable identity of a worker thread within the pool.
///
/// The `(identity, channel)` binding is fixed for the lifetime of the pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

// ============================================================================
// Connection IDs
// ============================================================================

/// Opaque client address bytes, assigned by the frontend.
///
/// The bytes are never interpreted by the core; they are carried verbatim
/// so replies can be routed back, and hex-formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(Bytes);

impl ConnId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Lowercase hex rendering of the address bytes.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in self.0.iter() {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<&[u8]> for ConnId {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

// ============================================================================
// Index classification
// ============================================================================

/// The kind of n-gram derivation an index file stores.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Raw byte trigrams.
    Gram3,
    /// 4-grams over printable ASCII runs.
    Text4,
    /// Hashed 4-byte grams folded into 24 bits.
    Hash4,
    /// Trigrams over text widened to UTF-16LE.
    Wide8,
}

impl IndexKind {
    /// All kinds, in the canonical build order.
    pub const ALL: [IndexKind; 4] = [
        IndexKind::Gram3,
        IndexKind::Text4,
        IndexKind::Hash4,
        IndexKind::Wide8,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Gram3 => "gram3",
            IndexKind::Text4 => "text4",
            IndexKind::Hash4 => "hash4",
            IndexKind::Wide8 => "wide8",
        }
    }

    /// Parses a kind name. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "gram3" => Some(IndexKind::Gram3),
            "text4" => Some(IndexKind::Text4),
            "hash4" => Some(IndexKind::Hash4),
            "wide8" => Some(IndexKind::Wide8),
            _ => None,
        }
    }

    /// Stable on-disk tag byte.
    pub fn as_byte(self) -> u8 {
        match self {
            IndexKind::Gram3 => 0,
            IndexKind::Text4 => 1,
            IndexKind::Hash4 => 2,
            IndexKind::Wide8 => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(IndexKind::Gram3),
            1 => Some(IndexKind::Text4),
            2 => Some(IndexKind::Hash4),
            3 => Some(IndexKind::Wide8),
            _ => None,
        }
    }
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Task display form
// ============================================================================

/// The display form of a task: id plus hex-encoded client address.
///
/// Returned by the `status` command for every live task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub connection: String,
    pub request: String,
}

impl TaskSpec {
    pub fn new(id: TaskId, connection: String, request: String) -> Self {
        Self {
            id,
            connection,
            request,
        }
    }
}
