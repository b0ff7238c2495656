//! Name index configuration.
//!
//! This module provides configuration options for the log engine and the
//! persistent name index built on top of it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use eventum_common::constants::{
    DEFAULT_BLOOM_EXPECTED_ITEMS, DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
    DEFAULT_CHECKPOINT_INTERVAL_MS, DEFAULT_FIRST_VALUE, DEFAULT_INITIAL_READER_COUNT,
    DEFAULT_MAX_READER_COUNT, DEFAULT_MEMORY_PAGES, DEFAULT_PAGE_SIZE_BITS,
    DEFAULT_READ_CACHE_CAPACITY, DEFAULT_VALUE_INTERVAL, LOG_RECORD_HEADER_SIZE,
    MAX_PAGE_SIZE_BITS, MIN_PAGE_SIZE_BITS,
};

use crate::error::{IndexError, IndexResult};

/// Configuration for the log-structured engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log page size as a power of two.
    pub page_size_bits: u32,

    /// Number of pages kept in memory at the tail of the log.
    pub memory_pages: usize,

    /// Whether checkpoints fsync the log device.
    pub sync_on_checkpoint: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size_bits: DEFAULT_PAGE_SIZE_BITS,
            memory_pages: DEFAULT_MEMORY_PAGES,
            sync_on_checkpoint: true,
        }
    }
}

impl EngineConfig {
    /// Sets the page size as a power of two.
    #[must_use]
    pub fn with_page_size_bits(mut self, bits: u32) -> Self {
        self.page_size_bits = bits;
        self
    }

    /// Sets the number of in-memory pages.
    #[must_use]
    pub fn with_memory_pages(mut self, pages: usize) -> Self {
        self.memory_pages = pages;
        self
    }

    /// Sets whether checkpoints fsync.
    #[must_use]
    pub fn with_sync_on_checkpoint(mut self, sync: bool) -> Self {
        self.sync_on_checkpoint = sync;
        self
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> u64 {
        1u64 << self.page_size_bits
    }

    /// Returns the largest key that fits in one page.
    pub fn max_key_len(&self) -> usize {
        let page = usize::try_from(self.page_size()).unwrap_or(usize::MAX);
        page.saturating_sub(LOG_RECORD_HEADER_SIZE)
            .min(usize::from(u16::MAX))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IndexResult<()> {
        if !(MIN_PAGE_SIZE_BITS..=MAX_PAGE_SIZE_BITS).contains(&self.page_size_bits) {
            return Err(IndexError::config_error(format!(
                "page size bits {} must be within {}..={}",
                self.page_size_bits, MIN_PAGE_SIZE_BITS, MAX_PAGE_SIZE_BITS
            )));
        }

        if self.memory_pages == 0 {
            return Err(IndexError::config_error(
                "at least one page must be kept in memory",
            ));
        }

        Ok(())
    }
}

/// Configuration for the optional bloom filter in front of lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistenceFilterConfig {
    /// Number of names the filter is sized for.
    pub expected_items: usize,

    /// Target false positive rate.
    pub false_positive_rate: f64,
}

impl Default for ExistenceFilterConfig {
    fn default() -> Self {
        Self {
            expected_items: DEFAULT_BLOOM_EXPECTED_ITEMS,
            false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
        }
    }
}

/// Configuration for a persistent name index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameIndexConfig {
    /// Name of the index, used for file names and logs.
    pub index_name: String,

    /// Directory holding the log device and checkpoint.
    pub log_dir: PathBuf,

    /// Value of the first entry.
    pub first_value: u32,

    /// Step between consecutive values.
    pub value_interval: u32,

    /// Reader sessions created up front.
    pub initial_reader_count: usize,

    /// Maximum reader sessions leased at once.
    pub max_reader_count: usize,

    /// Whether to cache lookups in an LRU cache.
    pub enable_read_cache: bool,

    /// Capacity of the read cache in entries.
    pub read_cache_capacity: u64,

    /// How often a dirty index is checkpointed.
    pub checkpoint_interval: Duration,

    /// Log page size as a power of two.
    pub page_size_bits: u32,

    /// Pages kept in memory.
    pub memory_pages: usize,

    /// Optional bloom filter consulted before reads.
    pub existence_filter: Option<ExistenceFilterConfig>,
}

impl Default for NameIndexConfig {
    fn default() -> Self {
        Self {
            index_name: "stream-name-index".to_string(),
            log_dir: PathBuf::from("data/index"),
            first_value: DEFAULT_FIRST_VALUE,
            value_interval: DEFAULT_VALUE_INTERVAL,
            initial_reader_count: DEFAULT_INITIAL_READER_COUNT,
            max_reader_count: DEFAULT_MAX_READER_COUNT,
            enable_read_cache: false,
            read_cache_capacity: DEFAULT_READ_CACHE_CAPACITY,
            checkpoint_interval: Duration::from_millis(DEFAULT_CHECKPOINT_INTERVAL_MS),
            page_size_bits: DEFAULT_PAGE_SIZE_BITS,
            memory_pages: DEFAULT_MEMORY_PAGES,
            existence_filter: None,
        }
    }
}

impl NameIndexConfig {
    /// Creates a configuration for `index_name` stored under `log_dir`.
    pub fn new(index_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_name: index_name.into(),
            log_dir: log_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the value sequence.
    #[must_use]
    pub fn with_values(mut self, first_value: u32, value_interval: u32) -> Self {
        self.first_value = first_value;
        self.value_interval = value_interval;
        self
    }

    /// Sets the reader pool bounds.
    #[must_use]
    pub fn with_readers(mut self, initial: usize, max: usize) -> Self {
        self.initial_reader_count = initial;
        self.max_reader_count = max;
        self
    }

    /// Enables the read cache with the given capacity.
    #[must_use]
    pub fn with_read_cache(mut self, capacity: u64) -> Self {
        self.enable_read_cache = true;
        self.read_cache_capacity = capacity;
        self
    }

    /// Sets the checkpoint debounce interval.
    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Sets the page size as a power of two.
    #[must_use]
    pub fn with_page_size_bits(mut self, bits: u32) -> Self {
        self.page_size_bits = bits;
        self
    }

    /// Sets the number of in-memory pages.
    #[must_use]
    pub fn with_memory_pages(mut self, pages: usize) -> Self {
        self.memory_pages = pages;
        self
    }

    /// Enables the existence filter.
    #[must_use]
    pub fn with_existence_filter(mut self, filter: ExistenceFilterConfig) -> Self {
        self.existence_filter = Some(filter);
        self
    }

    /// Returns the engine settings derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_page_size_bits(self.page_size_bits)
            .with_memory_pages(self.memory_pages)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IndexResult<()> {
        if self.index_name.is_empty() {
            return Err(IndexError::config_error("index name must not be empty"));
        }

        if self.first_value == 0 {
            return Err(IndexError::config_error(
                "first value must be positive, zero marks an empty index",
            ));
        }

        if self.value_interval == 0 {
            return Err(IndexError::config_error("value interval must be positive"));
        }

        if self.max_reader_count == 0 || self.initial_reader_count > self.max_reader_count {
            return Err(IndexError::config_error(format!(
                "reader counts {}..{} are invalid",
                self.initial_reader_count, self.max_reader_count
            )));
        }

        if self.enable_read_cache && self.read_cache_capacity == 0 {
            return Err(IndexError::config_error(
                "read cache capacity must be positive",
            ));
        }

        if self.checkpoint_interval.is_zero() {
            return Err(IndexError::config_error(
                "checkpoint interval must be positive",
            ));
        }

        if let Some(filter) = &self.existence_filter {
            if filter.expected_items == 0
                || !(filter.false_positive_rate > 0.0 && filter.false_positive_rate < 0.5)
            {
                return Err(IndexError::config_error(
                    "existence filter needs positive items and a rate within (0, 0.5)",
                ));
            }
        }

        self.engine().validate()
    }

    /// Returns the log device path.
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.index_name))
    }

    /// Returns the checkpoint metadata path.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.checkpoint", self.index_name))
    }
}
