//! Cache statistics for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for cache operations.
///
/// Counters are updated with relaxed atomics; read them through
/// [`CacheStats::snapshot`].
#[derive(Debug, Default)]
pub struct CacheStats {
    accesses: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup and whether it hit.
    #[inline]
    pub fn record_lookup(&self, hit: bool) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records an insertion of a new key.
    #[inline]
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a value replaced in place.
    #[inline]
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a capacity-driven eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an explicit removal.
    #[inline]
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            accesses: self.accesses.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters.
    pub fn reset(&self) {
        for counter in [
            &self.accesses,
            &self.hits,
            &self.misses,
            &self.inserts,
            &self.updates,
            &self.evictions,
            &self.removals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Counters captured by [`CacheStats::snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Total lookups.
    pub accesses: u64,
    /// Lookups that found the key.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// New keys stored.
    pub inserts: u64,
    /// Existing keys overwritten.
    pub updates: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries removed by the caller.
    pub removals: u64,
}

impl CacheStatsSnapshot {
    /// Returns the hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        }
    }
}

impl std::fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accesses: {}, hits: {}, misses: {}, hit_ratio: {:.2}%, inserts: {}, evictions: {}",
            self.accesses,
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0,
            self.inserts,
            self.evictions
        )
    }
}
