//! Command execution.
//!
//! The executor maps `(Command, Task, Snapshot)` to a [`Response`],
//! appending deferred changes to the task. It never blocks on a lock:
//! everything exclusive it touches was reserved through the lock planner
//! before it runs.

use std::collections::BTreeMap;

use tracing::{error, info};
use scour_db::{ConfigKey, DbChange, Snapshot, Task};
use scour_index::{allocate_name, DiskIterator, FileResultWriter, MemoryResultWriter};
use scour_types::IteratorId;

use crate::command::{Command, TaintMode};
use crate::error::{CommandError, CommandResult};
use crate::parse::parse_command;
use crate::response::{DatasetEntry, IndexEntry, Response};

/// Parses and executes a request, folding recoverable failures into an
/// error response.
///
/// Only command-layer errors are caught here. A panic below this frame
/// is an invariant violation: it propagates and takes the worker thread
/// down without committing the task.
pub fn dispatch_safe(request: &str, task: &Task, snap: &Snapshot) -> Response {
    info!(task = %task.id(), request = %request.trim(), "dispatch");
    match parse_command(request).and_then(|cmd| execute(&cmd, task, snap)) {
        Ok(response) => response,
        Err(e) => {
            error!(task = %task.id(), error = %e, "task failed");
            Response::error(e.to_string())
        }
    }
}

/// Executes one parsed command.
pub fn execute(cmd: &Command, task: &Task, snap: &Snapshot) -> CommandResult<Response> {
    match cmd {
        Command::Select {
            query,
            taints,
            datasets,
            iterator,
        } => {
            if *iterator {
                let id = IteratorId::new(allocate_name("iter_"));
                let data_path = snap.data_dir().join(DiskIterator::data_file_name(&id));

                let mut writer = FileResultWriter::create(&data_path).map_err(db_err)?;
                let stats = snap.execute(query, taints, datasets, &mut writer)?;
                let file_count = writer.finish().map_err(db_err)?;

                // Meta is written only after the data writer flushed.
                DiskIterator::create(snap.data_dir(), id.clone(), file_count)
                    .map_err(db_err)?;
                let meta_path = snap.data_dir().join(DiskIterator::meta_file_name(&id));
                task.record(DbChange::NewIterator(meta_path));

                Ok(Response::SelectIterator {
                    iterator: id,
                    file_count,
                    counters: stats,
                })
            } else {
                let mut writer = MemoryResultWriter::new();
                let stats = snap.execute(query, taints, datasets, &mut writer)?;
                Ok(Response::Select {
                    files: writer.into_files(),
                    counters: stats,
                })
            }
        }

        Command::IteratorPop { iterator, count } => {
            let mut handle = snap.open_iterator(iterator)?;
            let (files, position) = handle.pop(*count).map_err(db_err)?;
            if handle.exhausted() {
                task.record(DbChange::DropIterator(iterator.clone()));
            }
            Ok(Response::SelectFromIterator {
                files,
                position,
                total_files: handle.total_files(),
            })
        }

        Command::Index {
            paths,
            kinds,
            taints,
            ensure_unique,
        } => {
            if let Some(manifest) = snap.index_paths(kinds, taints, paths, *ensure_unique)? {
                task.record(DbChange::NewDataset(manifest));
            }
            Ok(Response::Ok)
        }

        Command::IndexFrom {
            list_path,
            kinds,
            taints,
            ensure_unique,
        } => {
            let contents =
                std::fs::read_to_string(list_path).map_err(scour_db::DbError::from)?;
            let paths: Vec<&str> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            if let Some(manifest) = snap.index_paths(kinds, taints, &paths, *ensure_unique)? {
                task.record(DbChange::NewDataset(manifest));
            }
            Ok(Response::Ok)
        }

        Command::ConfigGet { keys } => {
            let values = if keys.is_empty() {
                snap.config().get_all()
            } else {
                // Unknown names are silently dropped; `config set` is the
                // strict side of this asymmetry.
                let mut values = BTreeMap::new();
                for name in keys {
                    if let Some(key) = ConfigKey::parse(name) {
                        values.insert(name.clone(), snap.config().get(key));
                    }
                }
                values
            };
            Ok(Response::Config { keys: values })
        }

        Command::ConfigSet { key, value } => {
            let Some(parsed) = ConfigKey::parse(key) else {
                return Ok(Response::error(format!("unknown config key {key:?}")));
            };
            if !scour_db::Config::can_set(parsed, *value) {
                return Ok(Response::error(format!(
                    "value {value} out of range for config key {key}"
                )));
            }
            task.record(DbChange::ConfigChange(parsed, value.to_string()));
            Ok(Response::Ok)
        }

        Command::Reindex { dataset } => {
            let manifest = snap.reindex_dataset(dataset, &[])?;
            task.record(DbChange::NewDataset(manifest));
            task.record(DbChange::Drop(dataset.clone()));
            Ok(Response::Ok)
        }

        Command::Compact { kind: _ } => {
            // The candidate list was fixed at planning time: it is exactly
            // the set of dataset locks this snapshot holds.
            let ids = snap.locked_datasets();
            if ids.len() < 2 {
                return Ok(Response::Ok);
            }
            let manifest = snap.merge(&ids)?;
            task.record(DbChange::NewDataset(manifest));
            for id in ids {
                task.record(DbChange::Drop(id));
            }
            Ok(Response::Ok)
        }

        Command::Status => Ok(Response::Status {
            tasks: snap.task_specs(),
        }),

        Command::Topology => {
            let datasets = snap
                .datasets()
                .iter()
                .map(|ds| {
                    let indexes: Vec<IndexEntry> = ds
                        .indexes()
                        .iter()
                        .map(|index| IndexEntry {
                            kind: index.kind(),
                            size: index.size(),
                        })
                        .collect();
                    DatasetEntry {
                        id: ds.id().clone(),
                        size: indexes.iter().map(|entry| entry.size).sum(),
                        file_count: ds.file_count() as u64,
                        taints: ds.taints().iter().cloned().collect(),
                        indexes,
                    }
                })
                .collect();
            Ok(Response::Topology { datasets })
        }

        Command::Ping => Ok(Response::Ping {
            connection: task.conn().to_hex(),
        }),

        Command::Taint {
            dataset,
            mode,
            taint,
        } => {
            let ds = snap
                .find_dataset(dataset)
                .ok_or_else(|| scour_db::DbError::UnknownDataset(dataset.clone()))?;
            let has_taint = ds.has_taint(taint);
            let should_have = *mode == TaintMode::Add;
            if has_taint != should_have {
                task.record(DbChange::ToggleTaint(dataset.clone(), taint.clone()));
            }
            Ok(Response::Ok)
        }

        Command::DatasetDrop { dataset } => {
            task.record(DbChange::Drop(dataset.clone()));
            Ok(Response::Ok)
        }
    }
}

/// Shorthand: index-layer errors reach the client through the db error.
fn db_err(e: scour_index::IndexError) -> CommandError {
    CommandError::Db(scour_db::DbError::Index(e))
}
