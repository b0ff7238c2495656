//! The contract shared by the thread-safe cache variants.

use std::hash::Hash;

use eventum_common::error::EventumResult;

use crate::concurrent::ConcurrentCache;
use crate::lru::LruCache;
use crate::noop::NoLruCache;
use crate::{CacheConfig, CacheKind};

/// A thread-safe key/value cache.
///
/// Implementations differ in eviction policy: [`LruCache`] evicts least
/// recently used entries past its capacity, [`ConcurrentCache`] never evicts
/// and [`NoLruCache`] stores nothing.
pub trait EvictionCache<K, V>: Send + Sync {
    /// Looks up `key`, marking it most recently used on a hit.
    fn try_get(&self, key: &K) -> Option<V>;

    /// Inserts or replaces `key`, evicting as needed. Returns `value`.
    fn put(&self, key: K, value: V) -> V;

    /// Inserts `add(&key, &user_data)` if `key` is absent, otherwise replaces
    /// the current value with `update(&key, &current, &user_data)`.
    ///
    /// Returns the value now associated with `key`.
    fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V
    where
        Self: Sized;

    /// Removes `key`, returning its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Removes every entry.
    fn clear(&self);

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Returns true if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cache variant chosen at construction time.
///
/// Lets call sites hold one type whether caching is bounded, unbounded or
/// switched off.
pub enum CacheStrategy<K, V> {
    /// Bounded least-recently-used cache.
    Lru(LruCache<K, V>),
    /// Unbounded concurrent map.
    Concurrent(ConcurrentCache<K, V>),
    /// Caching disabled.
    Disabled(NoLruCache<K, V>),
}

impl<K, V> CacheStrategy<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds the variant selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn from_config(config: &CacheConfig) -> EventumResult<Self> {
        config.validate()?;
        Ok(match config.kind {
            CacheKind::Lru => Self::Lru(
                LruCache::new(config.capacity).with_stats(config.enable_stats),
            ),
            CacheKind::Concurrent => Self::Concurrent(ConcurrentCache::new()),
            CacheKind::Disabled => Self::Disabled(NoLruCache::new()),
        })
    }

    /// Returns the kind of this variant.
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Lru(_) => CacheKind::Lru,
            Self::Concurrent(_) => CacheKind::Concurrent,
            Self::Disabled(_) => CacheKind::Disabled,
        }
    }
}

impl<K, V> EvictionCache<K, V> for CacheStrategy<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn try_get(&self, key: &K) -> Option<V> {
        match self {
            Self::Lru(cache) => cache.try_get(key),
            Self::Concurrent(cache) => cache.try_get(key),
            Self::Disabled(cache) => cache.try_get(key),
        }
    }

    fn put(&self, key: K, value: V) -> V {
        match self {
            Self::Lru(cache) => cache.put(key, value),
            Self::Concurrent(cache) => cache.put(key, value),
            Self::Disabled(cache) => cache.put(key, value),
        }
    }

    fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        match self {
            Self::Lru(cache) => cache.put_with(key, user_data, add, update),
            Self::Concurrent(cache) => cache.put_with(key, user_data, add, update),
            Self::Disabled(cache) => cache.put_with(key, user_data, add, update),
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        match self {
            Self::Lru(cache) => cache.remove(key),
            Self::Concurrent(cache) => cache.remove(key),
            Self::Disabled(cache) => cache.remove(key),
        }
    }

    fn clear(&self) {
        match self {
            Self::Lru(cache) => cache.clear(),
            Self::Concurrent(cache) => cache.clear(),
            Self::Disabled(cache) => cache.clear(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Lru(cache) => cache.len(),
            Self::Concurrent(cache) => cache.len(),
            Self::Disabled(cache) => cache.len(),
        }
    }
}

impl<K, V> std::fmt::Debug for CacheStrategy<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Lru(_) => CacheKind::Lru,
            Self::Concurrent(_) => CacheKind::Concurrent,
            Self::Disabled(_) => CacheKind::Disabled,
        };
        f.debug_struct("CacheStrategy").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(kind: CacheKind) -> CacheStrategy<String, u32> {
        CacheStrategy::from_config(&CacheConfig::with_capacity(2).with_kind(kind)).unwrap()
    }

    #[test]
    fn test_lru_strategy_evicts() {
        let cache = strategy(CacheKind::Lru);
        cache.put("a".into(), 1);
        cache.put("b".into(), 2);
        cache.put("c".into(), 3);

        assert_eq!(cache.kind(), CacheKind::Lru);
        assert_eq!(cache.try_get(&"a".to_string()), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_strategy_never_evicts() {
        let cache = strategy(CacheKind::Concurrent);
        for i in 0..10 {
            cache.put(format!("k{i}"), i);
        }

        assert_eq!(cache.len(), 10);
        assert_eq!(cache.try_get(&"k0".to_string()), Some(0));
    }

    #[test]
    fn test_disabled_strategy_misses() {
        let cache = strategy(CacheKind::Disabled);
        assert_eq!(cache.put("a".into(), 1), 1);
        assert_eq!(cache.try_get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_with_through_strategy() {
        let cache = strategy(CacheKind::Lru);
        let first = cache.put_with("a".into(), 10, |_, d| *d, |_, v, d| v + d);
        let second = cache.put_with("a".into(), 5, |_, d| *d, |_, v, d| v + d);

        assert_eq!(first, 10);
        assert_eq!(second, 15);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CacheConfig::with_capacity(0);
        assert!(CacheStrategy::<String, u32>::from_config(&config).is_err());
    }
}
