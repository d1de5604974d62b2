//! Building and merging dataset artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use scour_types::{DatasetId, IndexKind};

use crate::dataset::Dataset;
use crate::error::{IndexError, IndexResult};
use crate::gram::file_grams;
use crate::index_file::IndexFile;

/// Builds a new dataset from a list of files.
///
/// Uses the builder pattern: configure kinds and taints, then call
/// [`DatasetBuilder::build`] with the file list.
#[derive(Debug)]
pub struct DatasetBuilder {
    data_dir: PathBuf,
    kinds: Vec<IndexKind>,
    taints: BTreeSet<String>,
}

impl DatasetBuilder {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            kinds: vec![IndexKind::Gram3],
            taints: BTreeSet::new(),
        }
    }

    /// Sets the index kinds to build. Duplicates are dropped.
    pub fn kinds(mut self, kinds: Vec<IndexKind>) -> Self {
        let unique: BTreeSet<IndexKind> = kinds.into_iter().collect();
        self.kinds = unique.into_iter().collect();
        self
    }

    /// Sets the taints the new dataset starts with.
    pub fn taints(mut self, taints: BTreeSet<String>) -> Self {
        self.taints = taints;
        self
    }

    /// Indexes `files` and writes the dataset's artifacts.
    ///
    /// Files are read in order; their position is the local file id.
    /// Unreadable files fail the whole build — a dataset with silently
    /// missing members would report wrong results forever after.
    pub fn build(self, files: Vec<String>) -> IndexResult<Dataset> {
        let id = DatasetId::new(crate::allocate_name("set_"));

        let mut postings_per_kind: BTreeMap<IndexKind, BTreeMap<u32, Vec<u32>>> =
            self.kinds.iter().map(|&kind| (kind, BTreeMap::new())).collect();

        for (file_id, file) in files.iter().enumerate() {
            let data = fs::read(file).map_err(|e| IndexError::io(file.as_str(), e))?;
            debug!(dataset = %id, file = %file, bytes = data.len(), "indexing file");

            for &kind in &self.kinds {
                let postings = postings_per_kind
                    .get_mut(&kind)
                    .expect("kind inserted above");
                for gram in file_grams(kind, &data) {
                    postings.entry(gram).or_default().push(file_id as u32);
                }
            }
        }

        let mut indexes = Vec::with_capacity(self.kinds.len());
        for (kind, postings) in postings_per_kind {
            let path = IndexFile::path_in(&self.data_dir, kind, id.as_str());
            indexes.push(IndexFile::write(&path, kind, postings)?);
        }

        let dataset = Dataset::new(id.clone(), files, self.taints, indexes);
        let manifest_path = self
            .data_dir
            .join(crate::dataset::DatasetManifest::file_name(&id));
        dataset.manifest().save(&manifest_path)?;

        info!(
            dataset = %id,
            files = dataset.file_count(),
            size = dataset.total_size(),
            "dataset built"
        );
        Ok(dataset)
    }
}

/// Merges datasets into one new dataset.
///
/// All inputs must carry the same index kind set. File lists concatenate
/// in input order; posting ids of later datasets shift by the file count
/// of everything before them, so merged lists stay sorted without a
/// re-sort. Taints union.
pub fn merge_datasets(data_dir: &Path, datasets: &[&Dataset]) -> IndexResult<Dataset> {
    let first = datasets.first().ok_or(IndexError::IncompatibleIndexes)?;
    let kinds = first.index_kinds();
    if datasets.iter().any(|ds| ds.index_kinds() != kinds) {
        return Err(IndexError::IncompatibleIndexes);
    }

    let id = DatasetId::new(crate::allocate_name("set_"));

    let mut files = Vec::new();
    let mut taints = BTreeSet::new();
    let mut offsets = Vec::with_capacity(datasets.len());
    for ds in datasets {
        offsets.push(files.len() as u32);
        files.extend_from_slice(ds.files());
        taints.extend(ds.taints().iter().cloned());
    }

    let mut indexes = Vec::with_capacity(kinds.len());
    for &kind in &kinds {
        let mut merged: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (ds, &offset) in datasets.iter().zip(&offsets) {
            let index = ds
                .indexes()
                .iter()
                .find(|index| index.kind() == kind)
                .expect("kind sets verified equal above");
            for (&gram, ids) in index.postings() {
                merged
                    .entry(gram)
                    .or_default()
                    .extend(ids.iter().map(|&file_id| file_id + offset));
            }
        }
        let path = IndexFile::path_in(data_dir, kind, id.as_str());
        indexes.push(IndexFile::write(&path, kind, merged)?);
    }

    let dataset = Dataset::new(id.clone(), files, taints, indexes);
    let manifest_path = data_dir.join(crate::dataset::DatasetManifest::file_name(&id));
    dataset.manifest().save(&manifest_path)?;

    info!(
        dataset = %id,
        merged = datasets.len(),
        files = dataset.file_count(),
        "datasets merged"
    );
    Ok(dataset)
}

/// Recursively collects regular files under the given paths.
///
/// Directories are walked depth-first; the result is sorted and
/// de-duplicated so repeated inputs do not inflate the corpus.
pub fn collect_files<S: AsRef<str>>(paths: &[S]) -> IndexResult<Vec<String>> {
    let mut files = Vec::new();
    for path in paths {
        walk(Path::new(path.as_ref()), &mut files)?;
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(path: &Path, out: &mut Vec<String>) -> IndexResult<()> {
    let meta = fs::metadata(path).map_err(|e| IndexError::io(path, e))?;
    if meta.is_dir() {
        let entries = fs::read_dir(path).map_err(|e| IndexError::io(path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| IndexError::io(path, e))?;
            walk(&entry.path(), out)?;
        }
    } else if meta.is_file() {
        out.push(path.to_string_lossy().into_owned());
    }
    Ok(())
}
