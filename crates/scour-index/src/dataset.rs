//! Dataset artifacts and query evaluation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use scour_query::Query;
use scour_types::{DatasetId, IndexKind};

use crate::error::{IndexError, IndexResult};
use crate::index_file::{intersect_sorted, union_sorted, IndexFile};

/// Metadata for one index file inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub kind: IndexKind,
    pub file_name: String,
    pub size: u64,
}

/// The on-disk manifest describing a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub id: DatasetId,
    pub files: Vec<String>,
    pub taints: BTreeSet<String>,
    pub indexes: Vec<IndexMeta>,
}

impl DatasetManifest {
    /// Conventional manifest file name for a dataset id.
    pub fn file_name(id: &DatasetId) -> String {
        format!("{id}.manifest")
    }

    /// Saves the manifest with bincode.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let encoded = bincode::serialize(self).map_err(|e| IndexError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, encoded).map_err(|e| IndexError::io(path, e))
    }

    /// Loads a manifest.
    pub fn load(path: &Path) -> IndexResult<Self> {
        let data = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        bincode::deserialize(&data).map_err(|e| IndexError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// An immutable, fully loaded dataset.
///
/// Once constructed, a dataset never changes: taint toggles and drops are
/// applied by the database producing a *new* dataset value, so snapshots
/// holding the old one stay consistent.
#[derive(Debug)]
pub struct Dataset {
    id: DatasetId,
    files: Vec<String>,
    taints: BTreeSet<String>,
    indexes: Vec<IndexFile>,
}

impl Dataset {
    pub fn new(
        id: DatasetId,
        files: Vec<String>,
        taints: BTreeSet<String>,
        indexes: Vec<IndexFile>,
    ) -> Self {
        Self {
            id,
            files,
            taints,
            indexes,
        }
    }

    /// Loads a dataset from its manifest path.
    pub fn load(data_dir: &Path, manifest_path: &Path) -> IndexResult<Self> {
        let manifest = DatasetManifest::load(manifest_path)?;
        let mut indexes = Vec::with_capacity(manifest.indexes.len());
        for meta in &manifest.indexes {
            indexes.push(IndexFile::open(&data_dir.join(&meta.file_name))?);
        }
        Ok(Self {
            id: manifest.id,
            files: manifest.files,
            taints: manifest.taints,
            indexes,
        })
    }

    /// Rebuilds this dataset's value with a different taint set.
    ///
    /// Index files are shared; only the manifest differs.
    pub fn with_taints(&self, taints: BTreeSet<String>) -> Self {
        Self {
            id: self.id.clone(),
            files: self.files.clone(),
            taints,
            indexes: self.indexes.clone(),
        }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn taints(&self) -> &BTreeSet<String> {
        &self.taints
    }

    pub fn has_taint(&self, taint: &str) -> bool {
        self.taints.contains(taint)
    }

    pub fn indexes(&self) -> &[IndexFile] {
        &self.indexes
    }

    /// The set of index kinds this dataset carries.
    pub fn index_kinds(&self) -> BTreeSet<IndexKind> {
        self.indexes.iter().map(IndexFile::kind).collect()
    }

    /// Sum of index file sizes — the dataset's footprint for compaction
    /// decisions and topology reporting.
    pub fn total_size(&self) -> u64 {
        self.indexes.iter().map(IndexFile::size).sum()
    }

    /// Manifest describing this dataset.
    pub fn manifest(&self) -> DatasetManifest {
        DatasetManifest {
            id: self.id.clone(),
            files: self.files.clone(),
            taints: self.taints.clone(),
            indexes: self
                .indexes
                .iter()
                .map(|index| IndexMeta {
                    kind: index.kind(),
                    file_name: IndexFile::file_name(index.kind(), self.id.as_str()),
                    size: index.size(),
                })
                .collect(),
        }
    }

    /// On-disk paths of every artifact belonging to this dataset.
    pub fn artifact_paths(&self, data_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![data_dir.join(DatasetManifest::file_name(&self.id))];
        for index in &self.indexes {
            paths.push(IndexFile::path_in(data_dir, index.kind(), self.id.as_str()));
        }
        paths
    }

    /// Evaluates a query, returning sorted local file ids of candidates.
    pub fn query(&self, query: &Query) -> Vec<u32> {
        match query {
            Query::Literal(literal) => self.literal_candidates(literal),
            Query::And(subs) => {
                let mut result: Option<Vec<u32>> = None;
                for sub in subs {
                    let candidates = self.query(sub);
                    result = Some(match result {
                        None => candidates,
                        Some(acc) => intersect_sorted(&acc, &candidates),
                    });
                    if result.as_ref().is_some_and(Vec::is_empty) {
                        break;
                    }
                }
                result.unwrap_or_default()
            }
            Query::Or(subs) => {
                let mut result = Vec::new();
                for sub in subs {
                    result = union_sorted(&result, &self.query(sub));
                }
                result
            }
            Query::MinOf { needed, queries } => {
                min_of_sorted(*needed, queries.iter().map(|q| self.query(q)))
            }
        }
    }

    /// Candidates for a single literal: the intersection over every index
    /// able to narrow it. If no index can, every file is a candidate.
    fn literal_candidates(&self, literal: &[u8]) -> Vec<u32> {
        let mut result: Option<Vec<u32>> = None;
        for index in &self.indexes {
            if let Some(candidates) = index.candidates(literal) {
                result = Some(match result {
                    None => candidates,
                    Some(acc) => intersect_sorted(&acc, &candidates),
                });
            }
        }
        result.unwrap_or_else(|| (0..self.files.len() as u32).collect())
    }
}

/// Ids present in at least `needed` of the sorted input lists.
fn min_of_sorted(needed: usize, lists: impl Iterator<Item = Vec<u32>>) -> Vec<u32> {
    let mut counts = std::collections::BTreeMap::new();
    for list in lists {
        for id in list {
            *counts.entry(id).or_insert(0usize) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, count)| count >= needed)
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;
    use tempfile::TempDir;

    fn corpus(dir: &Path) -> Vec<String> {
        let entries = [
            ("one.txt", b"the quick brown fox".as_slice()),
            ("two.txt", b"lazy dogs sleep all day".as_slice()),
            ("three.txt", b"quick dogs and lazy foxes".as_slice()),
        ];
        let mut files = Vec::new();
        for (name, contents) in entries {
            let path = dir.join(name);
            fs::write(&path, contents).unwrap();
            files.push(path.to_string_lossy().into_owned());
        }
        files
    }

    fn build(dir: &TempDir) -> Dataset {
        let files = corpus(dir.path());
        DatasetBuilder::new(dir.path().to_path_buf())
            .kinds(vec![IndexKind::Gram3, IndexKind::Text4])
            .build(files)
            .unwrap()
    }

    #[test]
    fn literal_query_finds_files() {
        let dir = TempDir::new().unwrap();
        let ds = build(&dir);

        let hits = ds.query(&Query::literal(*b"quick"));
        let names: Vec<&str> = hits.iter().map(|&id| ds.files()[id as usize].as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.contains("one") || n.contains("three")));
    }

    #[test]
    fn and_or_minof_combinators() {
        let dir = TempDir::new().unwrap();
        let ds = build(&dir);

        let and = Query::And(vec![Query::literal(*b"quick"), Query::literal(*b"lazy")]);
        assert_eq!(ds.query(&and).len(), 1); // only three.txt

        let or = Query::Or(vec![Query::literal(*b"fox"), Query::literal(*b"dogs")]);
        assert_eq!(ds.query(&or).len(), 3);

        let min = Query::MinOf {
            needed: 2,
            queries: vec![
                Query::literal(*b"quick"),
                Query::literal(*b"lazy"),
                Query::literal(*b"sleep"),
            ],
        };
        assert_eq!(ds.query(&min).len(), 2); // two.txt and three.txt
    }

    #[test]
    fn manifest_roundtrip_preserves_dataset() {
        let dir = TempDir::new().unwrap();
        let ds = build(&dir);

        let manifest_path = dir.path().join(DatasetManifest::file_name(ds.id()));
        let loaded = Dataset::load(dir.path(), &manifest_path).unwrap();

        assert_eq!(loaded.id(), ds.id());
        assert_eq!(loaded.files(), ds.files());
        assert_eq!(loaded.index_kinds(), ds.index_kinds());
        assert_eq!(
            loaded.query(&Query::literal(*b"quick")),
            ds.query(&Query::literal(*b"quick"))
        );
    }

    #[test]
    fn no_index_can_narrow_means_full_scan_candidates() {
        let dir = TempDir::new().unwrap();
        let files = corpus(dir.path());
        // Text4-only dataset cannot narrow a binary literal.
        let ds = DatasetBuilder::new(dir.path().to_path_buf())
            .kinds(vec![IndexKind::Text4])
            .build(files)
            .unwrap();

        let hits = ds.query(&Query::Literal(vec![0x00, 0x01, 0x02]));
        assert_eq!(hits.len(), ds.file_count());
    }
}
