//! A cache that stores nothing.
//!
//! Lets callers switch caching off without branching at every call site.

use std::marker::PhantomData;

use crate::traits::EvictionCache;

/// Null cache: every lookup misses and puts are pass-through.
pub struct NoLruCache<K, V> {
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> NoLruCache<K, V> {
    /// Creates the cache.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for NoLruCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EvictionCache<K, V> for NoLruCache<K, V> {
    fn try_get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, value: V) -> V {
        value
    }

    fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        _update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        add(&key, &user_data)
    }

    fn remove(&self, _key: &K) -> Option<V> {
        None
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

impl<K, V> std::fmt::Debug for NoLruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoLruCache").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_misses() {
        let cache = NoLruCache::new();
        assert_eq!(cache.put("a", 1), 1);
        assert_eq!(cache.try_get(&"a"), None);
        assert_eq!(cache.remove(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_with_calls_add() {
        let cache: NoLruCache<&str, u32> = NoLruCache::new();
        let value = cache.put_with("a", 7, |_, d| d + 1, |_, _, _| unreachable!());
        assert_eq!(value, 8);
    }
}
