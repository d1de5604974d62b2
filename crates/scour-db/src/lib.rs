//! # scour-db: Authoritative state for `Scour`
//!
//! The [`Database`] owns the mutable truth: the current dataset list, the
//! effective configuration, the live-task registry and the graveyard of
//! retired artifacts awaiting garbage collection.
//!
//! Reads never touch that mutable state directly. Every task gets a
//! [`Snapshot`]: an immutable view of datasets + config taken at dispatch
//! time. Mutations are deferred — the executor appends [`DbChange`]
//! records to its [`Task`], and the coordinator applies the whole batch
//! with [`Database::commit_task`] once the task's reply is on its way.
//! Snapshots taken before the commit keep seeing the old state (snapshot
//! isolation); artifacts they reference stay on disk until
//! [`Database::collect_garbage`] proves nothing live still needs them.

mod change;
mod config;
mod database;
mod error;
mod snapshot;
mod task;

pub use change::DbChange;
pub use config::{Config, ConfigKey};
pub use database::Database;
pub use error::{DbError, DbResult};
pub use snapshot::{Lock, SearchStats, Snapshot};
pub use task::{Task, TaskRegistry};

#[cfg(test)]
mod tests;
