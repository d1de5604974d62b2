//! Immutable snapshots and snapshot-scoped locks.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;
use scour_index::{
    collect_files, merge_datasets, Dataset, DatasetBuilder, DatasetManifest, DiskIterator,
    ResultWriter,
};
use scour_query::Query;
use scour_types::{DatasetId, IndexKind, IteratorId, TaskSpec};

use crate::config::{Config, ConfigKey};
use crate::error::{DbError, DbResult};
use crate::task::TaskRegistry;

// ============================================================================
// Locks
// ============================================================================

/// An exclusive resource claim, held at snapshot granularity.
///
/// At most one snapshot system-wide holds a given lock; the coordinator
/// enforces this by consulting every busy worker's snapshot before
/// granting a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lock {
    Dataset(DatasetId),
    Iterator(IteratorId),
}

// ============================================================================
// Search statistics
// ============================================================================

/// Counters reported with every select response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Datasets the query ran against.
    pub datasets_searched: u64,
    /// Candidate files produced across all datasets.
    pub files_considered: u64,
}

// ============================================================================
// Snapshot
// ============================================================================

/// A consistent view of datasets and configuration at a point in time.
///
/// The dataset list and config never change after creation. The lock set
/// is the one mutable field; only the coordinator thread touches it, as
/// part of granting lock requests. Long-lived operations read the live
/// task registry through the embedded handle (`status` needs tasks that
/// started after this snapshot did).
#[derive(Debug)]
pub struct Snapshot {
    datasets: Vec<Arc<Dataset>>,
    config: Config,
    locks: Mutex<BTreeSet<Lock>>,
    tasks: Arc<TaskRegistry>,
    data_dir: PathBuf,
}

impl Snapshot {
    pub(crate) fn new(
        datasets: Vec<Arc<Dataset>>,
        config: Config,
        tasks: Arc<TaskRegistry>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            datasets,
            config,
            locks: Mutex::new(BTreeSet::new()),
            tasks,
            data_dir,
        }
    }

    pub fn datasets(&self) -> &[Arc<Dataset>] {
        &self.datasets
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn find_dataset(&self, id: &DatasetId) -> Option<&Arc<Dataset>> {
        self.datasets.iter().find(|ds| ds.id() == id)
    }

    /// Specs of every live task, through the registry handle.
    pub fn task_specs(&self) -> Vec<TaskSpec> {
        self.tasks.specs()
    }

    // ------------------------------------------------------------------
    // Lock record
    // ------------------------------------------------------------------

    /// Records granted locks. Coordinator thread only.
    pub fn record_locks(&self, locks: &[Lock]) {
        let mut held = self.locks.lock().expect("snapshot locks poisoned");
        for lock in locks {
            held.insert(lock.clone());
        }
    }

    pub fn is_dataset_locked(&self, id: &DatasetId) -> bool {
        self.locks
            .lock()
            .expect("snapshot locks poisoned")
            .contains(&Lock::Dataset(id.clone()))
    }

    pub fn is_iterator_locked(&self, id: &IteratorId) -> bool {
        self.locks
            .lock()
            .expect("snapshot locks poisoned")
            .contains(&Lock::Iterator(id.clone()))
    }

    /// Dataset ids this snapshot holds locks on, in id order.
    pub fn locked_datasets(&self) -> Vec<DatasetId> {
        self.locks
            .lock()
            .expect("snapshot locks poisoned")
            .iter()
            .filter_map(|lock| match lock {
                Lock::Dataset(id) => Some(id.clone()),
                Lock::Iterator(_) => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Query execution
    // ------------------------------------------------------------------

    /// Runs a query against the snapshot's datasets.
    ///
    /// `taints` restricts to datasets carrying *all* the listed taints;
    /// `datasets` restricts to an explicit subset (every named dataset
    /// must exist). Matches stream to `writer` in dataset order.
    pub fn execute(
        &self,
        query: &Query,
        taints: &[String],
        datasets: &[DatasetId],
        writer: &mut dyn ResultWriter,
    ) -> DbResult<SearchStats> {
        let mut selected: Vec<&Arc<Dataset>> = Vec::new();
        if datasets.is_empty() {
            selected.extend(self.datasets.iter());
        } else {
            for id in datasets {
                let ds = self
                    .find_dataset(id)
                    .ok_or_else(|| DbError::UnknownDataset(id.clone()))?;
                selected.push(ds);
            }
        }

        let mut stats = SearchStats::default();
        for ds in selected {
            if !taints.iter().all(|taint| ds.has_taint(taint)) {
                continue;
            }
            let hits = ds.query(query);
            stats.datasets_searched += 1;
            stats.files_considered += hits.len() as u64;
            for id in hits {
                writer.push(&ds.files()[id as usize])?;
            }
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Index building
    // ------------------------------------------------------------------

    /// Every file already indexed by some dataset in this snapshot.
    fn known_files(&self) -> HashSet<&str> {
        self.datasets
            .iter()
            .flat_map(|ds| ds.files().iter().map(String::as_str))
            .collect()
    }

    /// Recursively indexes `paths` into a new dataset.
    ///
    /// In ensure-unique mode, files already present in any dataset are
    /// skipped; indexing nothing new is not an error. Returns the
    /// manifest path of the built dataset, or `None` if there was
    /// nothing to index.
    pub fn index_paths<S: AsRef<str>>(
        &self,
        kinds: &[IndexKind],
        taints: &BTreeSet<String>,
        paths: &[S],
        ensure_unique: bool,
    ) -> DbResult<Option<PathBuf>> {
        let mut files = collect_files(paths)?;
        if ensure_unique {
            let known = self.known_files();
            files.retain(|file| !known.contains(file.as_str()));
        }
        if files.is_empty() {
            debug!("nothing new to index");
            return Ok(None);
        }

        let kinds = if kinds.is_empty() {
            vec![IndexKind::Gram3]
        } else {
            kinds.to_vec()
        };

        let dataset = DatasetBuilder::new(self.data_dir.clone())
            .kinds(kinds)
            .taints(taints.clone())
            .build(files)?;
        Ok(Some(self.manifest_path(dataset.id())))
    }

    /// Rebuilds one dataset's index set, producing a replacement dataset.
    ///
    /// Returns the new manifest path. The caller pairs it with a `Drop`
    /// of the old dataset.
    pub fn reindex_dataset(
        &self,
        id: &DatasetId,
        kinds: &[IndexKind],
    ) -> DbResult<PathBuf> {
        let dataset = self
            .find_dataset(id)
            .ok_or_else(|| DbError::UnknownDataset(id.clone()))?;

        let kinds = if kinds.is_empty() {
            dataset.index_kinds().into_iter().collect()
        } else {
            kinds.to_vec()
        };

        let rebuilt = DatasetBuilder::new(self.data_dir.clone())
            .kinds(kinds)
            .taints(dataset.taints().clone())
            .build(dataset.files().to_vec())?;
        Ok(self.manifest_path(rebuilt.id()))
    }

    /// Merges the given datasets into one, returning the new manifest path.
    pub fn merge(&self, ids: &[DatasetId]) -> DbResult<PathBuf> {
        let mut inputs = Vec::with_capacity(ids.len());
        for id in ids {
            let ds = self
                .find_dataset(id)
                .ok_or_else(|| DbError::UnknownDataset(id.clone()))?;
            inputs.push(ds.as_ref());
        }
        let merged = merge_datasets(&self.data_dir, &inputs)?;
        Ok(self.manifest_path(merged.id()))
    }

    fn manifest_path(&self, id: &DatasetId) -> PathBuf {
        self.data_dir.join(DatasetManifest::file_name(id))
    }

    // ------------------------------------------------------------------
    // Compaction candidates
    // ------------------------------------------------------------------

    /// All mergeable datasets, bounded by the merge limits: the largest
    /// group sharing one index-kind set, smallest datasets first.
    pub fn full_compact_candidates(&self) -> Vec<DatasetId> {
        self.compact_candidates(false)
    }

    /// Like [`Snapshot::full_compact_candidates`], but only datasets no
    /// larger than twice the group's mean size — merging a huge dataset
    /// into small ones rewrites much data for little gain.
    pub fn smart_compact_candidates(&self) -> Vec<DatasetId> {
        self.compact_candidates(true)
    }

    fn compact_candidates(&self, smart: bool) -> Vec<DatasetId> {
        let max_datasets = self.config.get(ConfigKey::MergeMaxDatasets) as usize;
        let max_files = self.config.get(ConfigKey::MergeMaxFiles) as usize;

        // Group by index-kind set; only identical sets merge.
        let mut groups: Vec<(BTreeSet<IndexKind>, Vec<&Arc<Dataset>>)> = Vec::new();
        for ds in &self.datasets {
            let kinds = ds.index_kinds();
            match groups.iter_mut().find(|(k, _)| *k == kinds) {
                Some((_, members)) => members.push(ds),
                None => groups.push((kinds, vec![ds])),
            }
        }
        groups.sort_by_key(|(_, members)| std::cmp::Reverse(members.len()));

        let Some((_, mut members)) = groups.into_iter().next() else {
            return Vec::new();
        };
        if members.len() < 2 {
            return Vec::new();
        }

        if smart {
            let mean = members.iter().map(|ds| ds.total_size()).sum::<u64>()
                / members.len() as u64;
            members.retain(|ds| ds.total_size() <= mean.saturating_mul(2));
        }

        members.sort_by_key(|ds| ds.total_size());

        let mut candidates = Vec::new();
        let mut total_files = 0usize;
        for ds in members {
            if candidates.len() >= max_datasets {
                break;
            }
            if total_files + ds.file_count() > max_files {
                break;
            }
            total_files += ds.file_count();
            candidates.push(ds.id().clone());
        }

        if candidates.len() < 2 {
            Vec::new()
        } else {
            candidates
        }
    }

    // ------------------------------------------------------------------
    // Iterators
    // ------------------------------------------------------------------

    /// Opens a persisted iterator by id.
    pub fn open_iterator(&self, id: &IteratorId) -> DbResult<DiskIterator> {
        DiskIterator::open(&self.data_dir, id).map_err(|e| match e {
            scour_index::IndexError::IteratorNotFound(_) => {
                DbError::UnknownIterator(id.clone())
            }
            other => DbError::Index(other),
        })
    }
}
