//! # scour-index: Dataset and index layer for `Scour`
//!
//! A *dataset* is an immutable bundle of indexes over a fixed corpus of
//! files. Datasets are stored as a bincode manifest plus one index file
//! per [`IndexKind`](scour_types::IndexKind). Index files map 24-bit
//! n-gram ids to sorted posting lists of file ids and are protected by a
//! trailing CRC32.
//!
//! # File Layout
//!
//! ```text
//! data_dir/
//!   set_1a2b3c4d.manifest        # dataset manifest (bincode)
//!   gram3.set_1a2b3c4d.scix      # one index file per kind
//!   text4.set_1a2b3c4d.scix
//!   iter_99aabbcc.itdata         # iterator data file (newline paths)
//!   iter_99aabbcc.itmeta         # iterator meta file (bincode)
//! ```
//!
//! Queries are evaluated per dataset: a literal's n-grams select posting
//! lists which are intersected; `AND`/`OR`/`MIN OF` combine candidate
//! sets. The result is a *candidate* set — files guaranteed to contain
//! every n-gram of the pattern, which for the gram sizes used here is the
//! match set reported to clients.

mod builder;
mod dataset;
mod error;
mod gram;
mod index_file;
mod iterator;
mod writer;

pub use builder::{collect_files, merge_datasets, DatasetBuilder};
pub use dataset::{Dataset, DatasetManifest, IndexMeta};
pub use error::{IndexError, IndexResult};
pub use gram::{file_grams, query_grams};
pub use index_file::IndexFile;
pub use iterator::{DiskIterator, IteratorMeta};
pub use writer::{FileResultWriter, MemoryResultWriter, ResultWriter};

use rand::Rng;

/// Allocates a fresh random artifact name with the given prefix
/// (`set_` for datasets, `iter_` for iterators).
pub fn allocate_name(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{prefix}{suffix:08x}")
}
