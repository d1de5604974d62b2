//! Result writers for `select`.
//!
//! A query's matches stream through a [`ResultWriter`]: either collected
//! in memory for a direct reply, or spilled to an iterator data file when
//! the client asked for a persisted cursor.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

/// Sink for matching file paths.
pub trait ResultWriter {
    /// Records one matching path.
    fn push(&mut self, path: &str) -> IndexResult<()>;

    /// Number of paths recorded so far.
    fn file_count(&self) -> u64;
}

/// Collects matches in memory.
#[derive(Debug, Default)]
pub struct MemoryResultWriter {
    files: Vec<String>,
}

impl MemoryResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, returning the collected paths.
    pub fn into_files(self) -> Vec<String> {
        self.files
    }
}

impl ResultWriter for MemoryResultWriter {
    fn push(&mut self, path: &str) -> IndexResult<()> {
        // Result sets are unbounded; surface allocation failure as an
        // error response instead of aborting the worker.
        self.files
            .try_reserve(1)
            .map_err(|_| IndexError::OutOfMemory)?;
        self.files.push(path.to_string());
        Ok(())
    }

    fn file_count(&self) -> u64 {
        self.files.len() as u64
    }
}

/// Streams matches to a newline-separated data file.
///
/// The writer is buffered; [`FileResultWriter::finish`] flushes and
/// returns the final count. Iterator metadata must only be written after
/// `finish` succeeds, so a crashed select never leaves a meta file
/// pointing at a half-written data file.
#[derive(Debug)]
pub struct FileResultWriter {
    path: PathBuf,
    out: BufWriter<File>,
    count: u64,
}

impl FileResultWriter {
    pub fn create(path: &Path) -> IndexResult<Self> {
        let file = File::create(path).map_err(|e| IndexError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            count: 0,
        })
    }

    /// Flushes buffered output and returns the number of paths written.
    pub fn finish(mut self) -> IndexResult<u64> {
        self.out
            .flush()
            .map_err(|e| IndexError::io(&self.path, e))?;
        Ok(self.count)
    }
}

impl ResultWriter for FileResultWriter {
    fn push(&mut self, path: &str) -> IndexResult<()> {
        self.out
            .write_all(path.as_bytes())
            .and_then(|()| self.out.write_all(b"\n"))
            .map_err(|e| IndexError::io(&self.path, e))?;
        self.count += 1;
        Ok(())
    }

    fn file_count(&self) -> u64 {
        self.count
    }
}
