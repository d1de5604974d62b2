//! Lock planning.
//!
//! Pure function from `(Command, Snapshot)` to the exclusive locks the
//! command needs. The worker requests exactly this set from the
//! coordinator before executing; commands not listed here run lock-free
//! against their snapshot.

use scour_db::{Lock, Snapshot};

use crate::command::{Command, CompactKind};

/// Computes the locks a command requires.
///
/// Compaction fixes its candidate list here, at planning time: the
/// executor later compacts whatever this snapshot ended up locking.
pub fn plan_locks(cmd: &Command, snap: &Snapshot) -> Vec<Lock> {
    match cmd {
        Command::IteratorPop { iterator, .. } => vec![Lock::Iterator(iterator.clone())],
        Command::Reindex { dataset } => vec![Lock::Dataset(dataset.clone())],
        Command::Taint { dataset, .. } => vec![Lock::Dataset(dataset.clone())],
        Command::Compact { kind } => {
            let candidates = match kind {
                CompactKind::Smart => snap.smart_compact_candidates(),
                CompactKind::All => snap.full_compact_candidates(),
            };
            candidates.into_iter().map(Lock::Dataset).collect()
        }
        Command::Select { .. }
        | Command::Index { .. }
        | Command::IndexFrom { .. }
        | Command::ConfigGet { .. }
        | Command::ConfigSet { .. }
        | Command::Status
        | Command::Topology
        | Command::Ping
        | Command::DatasetDrop { .. } => Vec::new(),
    }
}
