//! Runtime configuration.
//!
//! Configuration is a small map of `u64` values under typed keys. Each
//! key carries its default and an allowed range; `config set` rejects
//! values outside it. Changes ride the usual deferred path: a
//! `ConfigChange` on the task, applied at commit, visible from the next
//! snapshot on.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// A known configuration key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    /// Worker pool size the daemon starts with.
    Workers,
    /// Maximum number of datasets merged by one compaction.
    MergeMaxDatasets,
    /// Maximum file count of a merged dataset.
    MergeMaxFiles,
    /// Suggested batch size for iterator pops.
    IteratorBatch,
}

impl ConfigKey {
    /// All known keys, in display order.
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::Workers,
        ConfigKey::MergeMaxDatasets,
        ConfigKey::MergeMaxFiles,
        ConfigKey::IteratorBatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Workers => "workers",
            ConfigKey::MergeMaxDatasets => "merge_max_datasets",
            ConfigKey::MergeMaxFiles => "merge_max_files",
            ConfigKey::IteratorBatch => "iterator_batch",
        }
    }

    /// Resolves a key name. Returns `None` for unknown names — callers
    /// decide whether that is an error (`config set`) or ignorable
    /// (`config get`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "workers" => Some(ConfigKey::Workers),
            "merge_max_datasets" => Some(ConfigKey::MergeMaxDatasets),
            "merge_max_files" => Some(ConfigKey::MergeMaxFiles),
            "iterator_batch" => Some(ConfigKey::IteratorBatch),
            _ => None,
        }
    }

    pub fn default_value(self) -> u64 {
        match self {
            ConfigKey::Workers => 4,
            ConfigKey::MergeMaxDatasets => 8,
            ConfigKey::MergeMaxFiles => 65_536,
            ConfigKey::IteratorBatch => 1024,
        }
    }

    pub fn valid_range(self) -> RangeInclusive<u64> {
        match self {
            ConfigKey::Workers => 1..=256,
            ConfigKey::MergeMaxDatasets => 2..=64,
            ConfigKey::MergeMaxFiles => 16..=1_048_576,
            ConfigKey::IteratorBatch => 1..=65_536,
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The effective configuration: every key has a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    values: BTreeMap<ConfigKey, u64>,
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> u64 {
        self.values
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.default_value())
    }

    /// True if the value is inside the key's allowed range.
    pub fn can_set(key: ConfigKey, value: u64) -> bool {
        key.valid_range().contains(&value)
    }

    /// Sets a value. The caller must have validated it with
    /// [`Config::can_set`]; out-of-range values are clamped-free rejected
    /// at the command layer, so this simply stores.
    pub fn set(&mut self, key: ConfigKey, value: u64) {
        self.values.insert(key, value);
    }

    /// Every key with its effective value, keyed by display name.
    pub fn get_all(&self) -> BTreeMap<String, u64> {
        ConfigKey::ALL
            .iter()
            .map(|&key| (key.as_str().to_string(), self.get(key)))
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigKey::ALL
                .iter()
                .map(|&key| (key, key.default_value()))
                .collect(),
        }
    }
}
