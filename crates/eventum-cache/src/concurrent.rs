//! Unbounded concurrent cache.
//!
//! Backed by a sharded `DashMap`. There is no eviction and no recency order:
//! the map grows with every distinct key, so it only suits callers that bound
//! the key space themselves.

use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::traits::EvictionCache;

/// A non-evicting cache for concurrent access.
pub struct ConcurrentCache<K, V> {
    map: DashMap<K, V>,
}

impl<K: Hash + Eq, V: Clone> ConcurrentCache<K, V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Creates an empty cache with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity),
        }
    }

    /// Gets a copy of the value for `key`.
    pub fn try_get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|v| v.value().clone())
    }

    /// Inserts or replaces `key`. Returns `value`.
    pub fn put(&self, key: K, value: V) -> V {
        self.map.insert(key, value.clone());
        value
    }

    /// Factory-based upsert. The shard holding `key` stays locked while the
    /// factory runs.
    pub fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                let value = update(occupied.key(), occupied.get(), &user_data);
                occupied.insert(value.clone());
                value
            }
            Entry::Vacant(vacant) => {
                let value = add(vacant.key(), &user_data);
                vacant.insert(value.clone());
                value
            }
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Hash + Eq, V: Clone> Default for ConcurrentCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionCache<K, V> for ConcurrentCache<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn try_get(&self, key: &K) -> Option<V> {
        ConcurrentCache::try_get(self, key)
    }

    fn put(&self, key: K, value: V) -> V {
        ConcurrentCache::put(self, key, value)
    }

    fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        ConcurrentCache::put_with(self, key, user_data, add, update)
    }

    fn remove(&self, key: &K) -> Option<V> {
        ConcurrentCache::remove(self, key)
    }

    fn clear(&self) {
        ConcurrentCache::clear(self);
    }

    fn len(&self) -> usize {
        ConcurrentCache::len(self)
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for ConcurrentCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCache")
            .field("len", &self.map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_never_evicts() {
        let cache = ConcurrentCache::new();
        for i in 0..10_000u32 {
            cache.put(i, i * 2);
        }

        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.try_get(&0), Some(0));
        assert_eq!(cache.try_get(&9_999), Some(19_998));
    }

    #[test]
    fn test_put_with_and_remove() {
        let cache = ConcurrentCache::with_capacity(4);
        assert_eq!(cache.put_with("a", 2, |_, d| *d, |_, v, d| v * d), 2);
        assert_eq!(cache.put_with("a", 3, |_, d| *d, |_, v, d| v * d), 6);

        assert_eq!(cache.remove(&"a"), Some(6));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_upserts() {
        let cache = Arc::new(ConcurrentCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        cache.put_with("hits", 1u64, |_, d| *d, |_, v, d| v + d);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.try_get(&"hits"), Some(8_000));
    }
}
