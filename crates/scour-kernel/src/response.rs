//! Response values and their textual encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use scour_db::SearchStats;
use scour_types::{DatasetId, IndexKind, IteratorId, TaskSpec};

/// One index file's entry in a topology response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: IndexKind,
    pub size: u64,
}

/// One dataset's entry in a topology response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: DatasetId,
    /// Aggregated size: sum of index sizes.
    pub size: u64,
    pub file_count: u64,
    pub taints: Vec<String>,
    pub indexes: Vec<IndexEntry>,
}

/// A reply to one client command.
///
/// Serialized as one line of JSON, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error {
        message: String,
    },
    Select {
        files: Vec<String>,
        counters: SearchStats,
    },
    SelectIterator {
        iterator: IteratorId,
        file_count: u64,
        counters: SearchStats,
    },
    SelectFromIterator {
        files: Vec<String>,
        position: u64,
        total_files: u64,
    },
    Config {
        keys: BTreeMap<String, u64>,
    },
    Status {
        tasks: Vec<TaskSpec>,
    },
    Topology {
        datasets: Vec<DatasetEntry>,
    },
    Ping {
        connection: String,
    },
}

impl Response {
    /// Shorthand for an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Encodes the response as one line of JSON.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"status\":\"error\",\"message\":\"encoding failed: {e}\"}}")
        })
    }

    /// Decodes a response from its textual form.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// True for the `error` variant.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}
