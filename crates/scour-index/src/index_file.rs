//! On-disk index files.
//!
//! # File Format
//!
//! ```text
//! [magic:u32][version:u16][kind:u8][postings:bincode][crc32:u32]
//!     4B         2B         1B        variable           4B
//! ```
//!
//! All integers are little-endian except the magic, which is the ASCII
//! bytes "SCIX" read big-endian. The CRC covers everything before it.
//! Postings are a map from 24-bit gram id to a sorted list of file ids
//! local to the owning dataset.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use scour_types::IndexKind;

use crate::error::{IndexError, IndexResult};

/// Index file magic: "SCIX".
const INDEX_MAGIC: u32 = 0x5343_4958;

/// Current index file version.
const INDEX_VERSION: u16 = 1;

/// Header size: magic(4) + version(2) + kind(1).
const HEADER_SIZE: usize = 7;

/// A loaded index file: one kind's postings for one dataset.
#[derive(Debug, Clone)]
pub struct IndexFile {
    kind: IndexKind,
    size: u64,
    postings: BTreeMap<u32, Vec<u32>>,
}

impl IndexFile {
    /// Writes postings to `path` and returns the loaded form.
    pub fn write(
        path: &Path,
        kind: IndexKind,
        postings: BTreeMap<u32, Vec<u32>>,
    ) -> IndexResult<Self> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&INDEX_MAGIC.to_be_bytes());
        buf.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        buf.push(kind.as_byte());

        bincode::serialize_into(&mut buf, &postings).map_err(|e| IndexError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        fs::write(path, &buf).map_err(|e| IndexError::io(path, e))?;

        Ok(Self {
            kind,
            size: buf.len() as u64,
            postings,
        })
    }

    /// Opens and verifies an index file.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let data = fs::read(path).map_err(|e| IndexError::io(path, e))?;

        if data.len() < HEADER_SIZE + 4 {
            return Err(IndexError::Truncated(path.to_path_buf()));
        }

        let magic = u32::from_be_bytes(
            data[0..4]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        if magic != INDEX_MAGIC {
            return Err(IndexError::InvalidMagic(magic));
        }

        let version = u16::from_le_bytes(
            data[4..6]
                .try_into()
                .expect("slice is exactly 2 bytes after bounds check"),
        );
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let kind = IndexKind::from_byte(data[6]).ok_or(IndexError::UnknownKind(data[6]))?;

        let body_end = data.len() - 4;
        let stored_crc = u32::from_le_bytes(
            data[body_end..]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        let actual_crc = crc32fast::hash(&data[..body_end]);
        if stored_crc != actual_crc {
            return Err(IndexError::Corrupted {
                path: path.to_path_buf(),
                expected: stored_crc,
                actual: actual_crc,
            });
        }

        let postings: BTreeMap<u32, Vec<u32>> = bincode::deserialize(&data[HEADER_SIZE..body_end])
            .map_err(|e| IndexError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            kind,
            size: data.len() as u64,
            postings,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// On-disk size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Posting list for one gram. Missing grams have no matching files.
    pub fn lookup(&self, gram: u32) -> &[u32] {
        self.postings.get(&gram).map_or(&[], Vec::as_slice)
    }

    /// Candidate file ids containing every gram of the literal, or `None`
    /// if this kind cannot narrow the literal at all.
    pub fn candidates(&self, literal: &[u8]) -> Option<Vec<u32>> {
        let grams = crate::gram::query_grams(self.kind, literal)?;

        let mut result: Option<Vec<u32>> = None;
        for gram in grams {
            let postings = self.lookup(gram);
            result = Some(match result {
                None => postings.to_vec(),
                Some(acc) => intersect_sorted(&acc, postings),
            });
            if result.as_ref().is_some_and(Vec::is_empty) {
                break;
            }
        }
        result
    }

    pub(crate) fn postings(&self) -> &BTreeMap<u32, Vec<u32>> {
        &self.postings
    }

    /// Conventional file name for a kind's index within a dataset.
    pub fn file_name(kind: IndexKind, dataset: &str) -> String {
        format!("{}.{}.scix", kind.as_str(), dataset)
    }

    /// Path of this index inside a data directory.
    pub fn path_in(data_dir: &Path, kind: IndexKind, dataset: &str) -> PathBuf {
        data_dir.join(Self::file_name(kind, dataset))
    }
}

/// Intersection of two sorted id lists.
pub(crate) fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two sorted id lists.
pub(crate) fn union_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
