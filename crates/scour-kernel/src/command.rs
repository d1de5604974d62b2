//! The command sum type.

use std::collections::BTreeSet;

use scour_query::Query;
use scour_types::{DatasetId, IndexKind, IteratorId};

/// Which datasets a compaction considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactKind {
    /// Every mergeable dataset.
    All,
    /// Only small datasets that merge productively.
    Smart,
}

/// Whether a taint command adds or removes the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaintMode {
    Add,
    Remove,
}

/// A parsed client command.
///
/// One closed sum over every operation: the executor and the lock
/// planner both match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a query, optionally materializing an iterator.
    Select {
        query: Query,
        taints: Vec<String>,
        datasets: Vec<DatasetId>,
        iterator: bool,
    },
    /// Read the next batch from a persisted iterator.
    IteratorPop { iterator: IteratorId, count: u64 },
    /// Recursively index paths into a new dataset.
    Index {
        paths: Vec<String>,
        kinds: Vec<IndexKind>,
        taints: BTreeSet<String>,
        ensure_unique: bool,
    },
    /// Like `Index`, with the path list read from a file.
    IndexFrom {
        list_path: String,
        kinds: Vec<IndexKind>,
        taints: BTreeSet<String>,
        ensure_unique: bool,
    },
    /// Read config values (all keys when empty).
    ConfigGet { keys: Vec<String> },
    /// Set one config value.
    ConfigSet { key: String, value: u64 },
    /// Rebuild one dataset's index set.
    Reindex { dataset: DatasetId },
    /// Merge datasets.
    Compact { kind: CompactKind },
    /// List live tasks.
    Status,
    /// Describe every dataset in the snapshot.
    Topology,
    /// Echo the caller's connection id.
    Ping,
    /// Add or remove a taint on a dataset.
    Taint {
        dataset: DatasetId,
        mode: TaintMode,
        taint: String,
    },
    /// Drop a dataset from the published list.
    DatasetDrop { dataset: DatasetId },
}
