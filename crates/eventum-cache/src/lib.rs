//! Caching utilities for eventum.
//!
//! This crate provides the cache family used on the read paths, all sharing
//! the [`EvictionCache`] contract where they are thread-safe:
//!
//! - **LRU Cache**: size-bounded least recently used cache behind one lock
//! - **Sticky LRU Cache**: count-bounded, single-owner, never evicts pinned entries
//! - **Concurrent Cache**: unbounded concurrent map with no eviction
//! - **No-op Cache**: stores nothing, for switching caching off
//! - **Bloom Filter**: probabilistic data structure for fast negative lookups
//!
//! # Example
//!
//! ```rust
//! use eventum_cache::lru::LruCache;
//!
//! let cache = LruCache::new(100);
//! cache.put("key1", "value1");
//! assert_eq!(cache.try_get(&"key1"), Some("value1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bloom;
pub mod concurrent;
mod list;
pub mod lru;
pub mod noop;
pub mod stats;
pub mod sticky;
pub mod traits;

pub use bloom::BloomFilter;
pub use concurrent::ConcurrentCache;
pub use lru::LruCache;
pub use noop::NoLruCache;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use sticky::StickyLruCache;
pub use traits::{CacheStrategy, EvictionCache};

use serde::{Deserialize, Serialize};

use eventum_common::constants::DEFAULT_CACHE_CAPACITY;
use eventum_common::error::{EventumError, EventumResult};

/// Which cache implementation a [`CacheConfig`] selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Bounded [`LruCache`].
    #[default]
    Lru,
    /// Unbounded [`ConcurrentCache`].
    Concurrent,
    /// [`NoLruCache`], caching off.
    Disabled,
}

/// Configuration for cache behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum total entry size; entry count when items have unit size.
    pub capacity: u64,
    /// Implementation to build.
    pub kind: CacheKind,
    /// Whether to collect statistics.
    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            kind: CacheKind::Lru,
            enable_stats: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new config with the given capacity.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Sets the cache implementation.
    #[must_use]
    pub fn with_kind(mut self, kind: CacheKind) -> Self {
        self.kind = kind;
        self
    }

    /// Enables or disables statistics collection.
    #[must_use]
    pub fn with_stats(mut self, enable: bool) -> Self {
        self.enable_stats = enable;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a bounded cache has zero capacity.
    pub fn validate(&self) -> EventumResult<()> {
        if self.kind == CacheKind::Lru && self.capacity == 0 {
            return Err(EventumError::invalid_config(
                "lru cache capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.kind, CacheKind::Lru);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_only_matters_when_bounded() {
        assert!(CacheConfig::with_capacity(0).validate().is_err());
        assert!(CacheConfig::with_capacity(0)
            .with_kind(CacheKind::Disabled)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "capacity": 10, "kind": "concurrent" }"#).unwrap();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.kind, CacheKind::Concurrent);
        assert!(config.enable_stats);

        let json = serde_json::to_string(&config.with_stats(false)).unwrap();
        assert!(json.contains("\"enable_stats\":false"));
    }
}
