//! Deferred database changes.

use std::path::PathBuf;

use scour_types::{DatasetId, IteratorId};

use crate::config::ConfigKey;

/// A pending mutation recorded on a task and applied at commit.
///
/// Changes are append-only on their owning task and applied in order as
/// one batch, so a task's effects become visible atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbChange {
    /// A freshly built dataset; the path is its manifest file.
    NewDataset(PathBuf),
    /// A freshly materialized iterator; the path is its meta file.
    NewIterator(PathBuf),
    /// Retire an exhausted iterator's artifacts.
    DropIterator(IteratorId),
    /// Set a config key. The value is kept in its decimal string form.
    ConfigChange(ConfigKey, String),
    /// Flip one taint on a dataset.
    ToggleTaint(DatasetId, String),
    /// Remove a dataset from the published list.
    Drop(DatasetId),
}
