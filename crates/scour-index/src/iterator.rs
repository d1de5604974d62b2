//! Persisted result iterators.
//!
//! An iterator is a pair of files: a data file of newline-separated
//! matching paths, and a meta file recording the data file name, the
//! total count and the read cursor. The meta file is written atomically
//! (temp file + rename) both at creation and after every pop, so a crash
//! mid-pop re-serves the same batch instead of losing it.

use std::fs;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use scour_types::IteratorId;

use crate::error::{IndexError, IndexResult};

/// On-disk iterator metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IteratorMeta {
    /// File name of the data file, relative to the data directory.
    pub data_file: String,
    /// Total number of paths in the data file.
    pub total_files: u64,
    /// Number of paths already popped.
    pub position: u64,
    /// Byte offset of the next unread path in the data file.
    pub byte_offset: u64,
}

/// Handle to a persisted iterator.
#[derive(Debug)]
pub struct DiskIterator {
    id: IteratorId,
    data_dir: PathBuf,
    meta: IteratorMeta,
}

impl DiskIterator {
    /// Conventional file names for an iterator id.
    pub fn data_file_name(id: &IteratorId) -> String {
        format!("{id}.itdata")
    }

    pub fn meta_file_name(id: &IteratorId) -> String {
        format!("{id}.itmeta")
    }

    /// Registers a new iterator over an already-written data file.
    ///
    /// Must only be called after the data writer has flushed.
    pub fn create(data_dir: &Path, id: IteratorId, total_files: u64) -> IndexResult<Self> {
        let meta = IteratorMeta {
            data_file: Self::data_file_name(&id),
            total_files,
            position: 0,
            byte_offset: 0,
        };
        let iterator = Self {
            id,
            data_dir: data_dir.to_path_buf(),
            meta,
        };
        iterator.persist_meta()?;
        Ok(iterator)
    }

    /// Opens an existing iterator by id.
    pub fn open(data_dir: &Path, id: &IteratorId) -> IndexResult<Self> {
        let meta_path = data_dir.join(Self::meta_file_name(id));
        let data = fs::read(&meta_path)
            .map_err(|_| IndexError::IteratorNotFound(id.to_string()))?;
        let meta: IteratorMeta = bincode::deserialize(&data).map_err(|e| IndexError::Decode {
            path: meta_path,
            reason: e.to_string(),
        })?;
        Ok(Self {
            id: id.clone(),
            data_dir: data_dir.to_path_buf(),
            meta,
        })
    }

    pub fn id(&self) -> &IteratorId {
        &self.id
    }

    pub fn total_files(&self) -> u64 {
        self.meta.total_files
    }

    pub fn position(&self) -> u64 {
        self.meta.position
    }

    /// True once every path has been popped.
    pub fn exhausted(&self) -> bool {
        self.meta.position >= self.meta.total_files
    }

    /// Reads up to `count` paths from the cursor and advances it.
    ///
    /// Returns the paths and the new position. The cursor is persisted
    /// before returning.
    pub fn pop(&mut self, count: u64) -> IndexResult<(Vec<String>, u64)> {
        let data_path = self.data_dir.join(&self.meta.data_file);
        let file = fs::File::open(&data_path).map_err(|e| IndexError::io(&data_path, e))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.meta.byte_offset))
            .map_err(|e| IndexError::io(&data_path, e))?;

        let mut files = Vec::new();
        let mut line = String::new();
        while (files.len() as u64) < count {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| IndexError::io(&data_path, e))?;
            if read == 0 {
                break;
            }
            self.meta.byte_offset += read as u64;
            files.push(line.trim_end_matches('\n').to_string());
        }

        self.meta.position += files.len() as u64;
        self.persist_meta()?;

        debug!(
            iterator = %self.id,
            popped = files.len(),
            position = self.meta.position,
            "iterator pop"
        );
        Ok((files, self.meta.position))
    }

    /// Removes both files of this iterator.
    pub fn remove_artifacts(data_dir: &Path, id: &IteratorId) -> IndexResult<()> {
        for name in [Self::data_file_name(id), Self::meta_file_name(id)] {
            let path = data_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io(&path, e)),
            }
        }
        Ok(())
    }

    fn persist_meta(&self) -> IndexResult<()> {
        let meta_path = self.data_dir.join(Self::meta_file_name(&self.id));
        let tmp_path = meta_path.with_extension("itmeta.tmp");
        let encoded = bincode::serialize(&self.meta).map_err(|e| IndexError::Decode {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&tmp_path, encoded).map_err(|e| IndexError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &meta_path).map_err(|e| IndexError::io(&meta_path, e))?;
        Ok(())
    }
}
