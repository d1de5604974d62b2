//! The authoritative database.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};
use scour_index::{Dataset, DiskIterator};
use scour_types::{ConnId, DatasetId, IteratorId, TaskId};

use crate::change::DbChange;
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::snapshot::Snapshot;
use crate::task::{Task, TaskRegistry};

/// Published state: the dataset list and config visible to new snapshots.
#[derive(Debug)]
struct Published {
    datasets: Vec<Arc<Dataset>>,
    config: Config,
}

/// Artifacts retired from the published state, awaiting collection.
#[derive(Debug, Default)]
struct Graveyard {
    datasets: Vec<Arc<Dataset>>,
    iterators: Vec<IteratorId>,
}

/// The authoritative mutable state of the service.
///
/// The published dataset list and config change only inside
/// [`Database::commit_task`], which the coordinator calls between
/// dispatches — snapshots taken before a commit keep their view.
/// Retired artifacts stay on disk until [`Database::collect_garbage`]
/// observes that no busy worker's snapshot references them.
#[derive(Debug)]
pub struct Database {
    data_dir: PathBuf,
    published: RwLock<Published>,
    tasks: Arc<TaskRegistry>,
    next_task_id: AtomicU64,
    graveyard: Mutex<Graveyard>,
}

impl Database {
    /// Opens a database, loading every dataset manifest in `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> DbResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let mut datasets = Vec::new();
        for entry in std::fs::read_dir(&data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("manifest") {
                let dataset = Dataset::load(&data_dir, &path)?;
                info!(
                    dataset = %dataset.id(),
                    files = dataset.file_count(),
                    "loaded dataset"
                );
                datasets.push(Arc::new(dataset));
            }
        }
        datasets.sort_by(|a, b| a.id().cmp(b.id()));

        info!(
            path = %data_dir.display(),
            datasets = datasets.len(),
            "database open"
        );

        Ok(Self {
            data_dir,
            published: RwLock::new(Published {
                datasets,
                config: Config::default(),
            }),
            tasks: Arc::new(TaskRegistry::new()),
            next_task_id: AtomicU64::new(1),
            graveyard: Mutex::new(Graveyard::default()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Takes a consistent view of the current datasets and config.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let published = self.published.read().expect("published state poisoned");
        Arc::new(Snapshot::new(
            published.datasets.clone(),
            published.config.clone(),
            Arc::clone(&self.tasks),
            self.data_dir.clone(),
        ))
    }

    /// Creates and registers a task for an accepted request.
    pub fn allocate_task(&self, request: &str, conn: ConnId) -> Arc<Task> {
        let id = TaskId::new(self.next_task_id.fetch_add(1, Ordering::SeqCst));
        let task = Arc::new(Task::new(id, conn, request.to_string()));
        self.tasks.insert(Arc::clone(&task));
        task
    }

    /// Number of live tasks.
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Commits a task: drains its pending changes and applies them in
    /// order, then unregisters it.
    pub fn commit_task(&self, id: TaskId) -> DbResult<()> {
        let task = self.tasks.remove(id).ok_or(DbError::UnknownTask(id))?;
        let changes = task.drain_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let mut published = self.published.write().expect("published state poisoned");
        let mut graveyard = self.graveyard.lock().expect("graveyard poisoned");

        for change in changes {
            self.apply_change(&mut published, &mut graveyard, change, id);
        }
        Ok(())
    }

    fn apply_change(
        &self,
        published: &mut Published,
        graveyard: &mut Graveyard,
        change: DbChange,
        task: TaskId,
    ) {
        match change {
            DbChange::NewDataset(manifest_path) => {
                match Dataset::load(&self.data_dir, &manifest_path) {
                    Ok(dataset) => {
                        info!(task = %task, dataset = %dataset.id(), "dataset published");
                        published.datasets.push(Arc::new(dataset));
                    }
                    Err(e) => {
                        // The artifact was built by the committing task;
                        // failing to read it back is an invariant breach,
                        // but losing one dataset beats losing the server.
                        warn!(task = %task, error = %e, "failed to load committed dataset");
                    }
                }
            }
            DbChange::NewIterator(meta_path) => {
                info!(task = %task, path = %meta_path.display(), "iterator registered");
            }
            DbChange::DropIterator(id) => {
                info!(task = %task, iterator = %id, "iterator retired");
                graveyard.iterators.push(id);
            }
            DbChange::ConfigChange(key, value) => match value.parse::<u64>() {
                Ok(parsed) => {
                    info!(task = %task, key = %key, value = parsed, "config changed");
                    published.config.set(key, parsed);
                }
                Err(_) => {
                    warn!(task = %task, key = %key, value = %value, "non-decimal config change");
                }
            },
            DbChange::ToggleTaint(id, taint) => {
                let Some(slot) = published.datasets.iter_mut().find(|ds| *ds.id() == id)
                else {
                    warn!(task = %task, dataset = %id, "taint toggle on missing dataset");
                    return;
                };
                let mut taints = slot.taints().clone();
                if !taints.remove(&taint) {
                    taints.insert(taint.clone());
                }
                let updated = Arc::new(slot.with_taints(taints));
                if let Err(e) = updated
                    .manifest()
                    .save(&self.data_dir.join(scour_index::DatasetManifest::file_name(&id)))
                {
                    warn!(task = %task, dataset = %id, error = %e, "taint manifest write failed");
                }
                info!(task = %task, dataset = %id, taint = %taint, "taint toggled");
                *slot = updated;
            }
            DbChange::Drop(id) => {
                let before = published.datasets.len();
                let mut dropped = Vec::new();
                published.datasets.retain(|ds| {
                    if *ds.id() == id {
                        dropped.push(Arc::clone(ds));
                        false
                    } else {
                        true
                    }
                });
                if published.datasets.len() == before {
                    warn!(task = %task, dataset = %id, "drop of missing dataset");
                } else {
                    info!(task = %task, dataset = %id, "dataset dropped");
                    graveyard.datasets.extend(dropped);
                }
            }
        }
    }

    /// Deletes retired artifacts no active snapshot references.
    ///
    /// `active` must be the snapshots of every worker currently holding a
    /// task. A retired dataset survives while any of them still lists its
    /// id; a retired iterator survives while any of them holds its lock.
    pub fn collect_garbage(&self, active: &[Arc<Snapshot>]) {
        let mut graveyard = self.graveyard.lock().expect("graveyard poisoned");

        let dead_datasets = take_where(&mut graveyard.datasets, |ds| {
            !active
                .iter()
                .any(|snap| snap.find_dataset(ds.id()).is_some())
        });
        for dataset in dead_datasets {
            info!(dataset = %dataset.id(), "collecting dataset artifacts");
            for path in dataset.artifact_paths(&self.data_dir) {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "artifact removal failed");
                    }
                }
            }
        }

        let dead_iterators = take_where(&mut graveyard.iterators, |id| {
            !active.iter().any(|snap| snap.is_iterator_locked(id))
        });
        for id in dead_iterators {
            info!(iterator = %id, "collecting iterator artifacts");
            if let Err(e) = DiskIterator::remove_artifacts(&self.data_dir, &id) {
                warn!(iterator = %id, error = %e, "iterator removal failed");
            }
        }
    }

    /// Current dataset ids, for inspection and tests.
    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        self.published
            .read()
            .expect("published state poisoned")
            .datasets
            .iter()
            .map(|ds| ds.id().clone())
            .collect()
    }

    /// Number of graveyard entries, for inspection and tests.
    pub fn graveyard_len(&self) -> usize {
        let graveyard = self.graveyard.lock().expect("graveyard poisoned");
        graveyard.datasets.len() + graveyard.iterators.len()
    }
}

/// Removes and returns every element matching the predicate.
fn take_where<T>(items: &mut Vec<T>, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
    let mut taken = Vec::new();
    let mut i = 0;
    while i < items.len() {
        if predicate(&items[i]) {
            taken.push(items.remove(i));
        } else {
            i += 1;
        }
    }
    taken
}
