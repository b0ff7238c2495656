//! Count-bounded LRU cache with per-entry stickiness.
//!
//! Each entry carries an integer stickiness. Eviction only drops entries whose
//! stickiness is exactly zero. When the least recently used entry is sticky,
//! it is moved to the most recently used end and eviction stops for that put,
//! so a cache full of sticky entries grows past `max_count` until callers
//! remove or unstick them.
//!
//! The cache is not internally synchronized. All operations take `&mut self`
//! and callers serialize access themselves.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use crate::list::{Handle, LinkedSlab};

struct Entry<K, V> {
    key: K,
    value: V,
    stickiness: i32,
}

/// Single-owner LRU cache that never evicts sticky entries.
///
/// # Example
///
/// ```
/// use eventum_cache::sticky::StickyLruCache;
///
/// let mut cache = StickyLruCache::new(2);
/// cache.put("pinned", 1, 1);
/// cache.put("a", 2, 0);
/// cache.put("b", 3, 0);
///
/// assert_eq!(cache.try_get(&"pinned"), Some(&1));
/// ```
pub struct StickyLruCache<K, V> {
    max_count: usize,
    map: HashMap<K, Handle>,
    order: LinkedSlab<Entry<K, V>>,
}

impl<K: Hash + Eq + Clone, V> StickyLruCache<K, V> {
    /// Creates a cache holding up to `max_count` non-sticky entries.
    ///
    /// # Panics
    ///
    /// Panics if `max_count` is 0.
    pub fn new(max_count: usize) -> Self {
        assert!(max_count > 0, "max_count must be greater than 0");
        Self {
            max_count,
            map: HashMap::with_capacity(max_count),
            order: LinkedSlab::with_capacity(max_count),
        }
    }

    /// Returns the nominal entry limit.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Returns the number of entries, which may exceed `max_count`.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn try_get(&mut self, key: &K) -> Option<&V> {
        let handle = *self.map.get(key)?;
        self.order.move_to_back(handle);
        self.order.get(handle).map(|entry| &entry.value)
    }

    /// Returns the accumulated stickiness of `key` without touching recency.
    pub fn stickiness(&self, key: &K) -> Option<i32> {
        let handle = *self.map.get(key)?;
        self.order.get(handle).map(|entry| entry.stickiness)
    }

    /// Inserts or updates `key`.
    ///
    /// On update the value is replaced and `stickiness` is added to the
    /// entry's current stickiness. A negative `stickiness` releases a
    /// previous pin.
    pub fn put(&mut self, key: K, value: V, stickiness: i32) {
        if let Some(&handle) = self.map.get(&key) {
            if let Some(entry) = self.order.get_mut(handle) {
                entry.value = value;
                entry.stickiness = entry.stickiness.saturating_add(stickiness);
            }
            self.order.move_to_back(handle);
            return;
        }

        self.ensure_capacity();
        let handle = self.order.push_back(Entry {
            key: key.clone(),
            value,
            stickiness,
        });
        self.map.insert(key, handle);
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let handle = self.map.remove(key)?;
        self.order.remove(handle).map(|entry| entry.value)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.drain();
    }

    fn ensure_capacity(&mut self) {
        while self.order.len() >= self.max_count {
            let Some(front) = self.order.front() else {
                break;
            };
            let sticky = self
                .order
                .get(front)
                .map_or(false, |entry| entry.stickiness != 0);
            if sticky {
                // Leave it over capacity; later puts may find room.
                trace!(
                    len = self.order.len(),
                    max_count = self.max_count,
                    "sticky entry at eviction point"
                );
                self.order.move_to_back(front);
                break;
            }
            if let Some(entry) = self.order.remove(front) {
                self.map.remove(&entry.key);
            }
        }
    }
}

impl<K, V> std::fmt::Debug for StickyLruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickyLruCache")
            .field("max_count", &self.max_count)
            .field("len", &self.map.len())
            .finish()
    }
}
