//! # scour-kernel: Command layer for `Scour`
//!
//! The kernel turns a request line into a response:
//!
//! 1. [`parse_command`] produces a [`Command`] — one closed sum over
//!    every operation the service supports.
//! 2. [`plan_locks`] derives the exclusive locks the command needs;
//!    the worker acquires them through the coordinator *before* step 3.
//! 3. [`execute`] runs the command against a task and its snapshot,
//!    appending deferred [`DbChange`](scour_db::DbChange)s to the task.
//!
//! Both `execute` and `plan_locks` dispatch over the same enum, so adding
//! a command forces both matches to be revisited.
//!
//! [`dispatch_safe`] is the worker's entry point: it folds every
//! recoverable failure — parse errors, unknown resources, I/O failures,
//! allocation failure while collecting results — into
//! [`Response::error`]. Anything else propagates and kills the worker
//! thread.

mod command;
mod error;
mod executor;
mod locks;
mod parse;
mod response;

pub use command::{Command, CompactKind, TaintMode};
pub use error::{CommandError, CommandResult};
pub use executor::{dispatch_safe, execute};
pub use locks::plan_locks;
pub use parse::parse_command;
pub use response::{DatasetEntry, IndexEntry, Response};
