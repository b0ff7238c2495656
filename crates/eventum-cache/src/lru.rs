//! LRU (Least Recently Used) Cache implementation.
//!
//! A capacity-bounded cache with O(1) lookup, insert and eviction. Entries
//! live in an arena-backed linked list ordered from least to most recently
//! used, indexed by a `HashMap`.
//!
//! Capacity is measured in units chosen by the caller: every entry has a size
//! computed by `calculate_item_size` (one unit by default), and puts evict
//! from the least recently used end until the incoming entry fits.
//!
//! Every operation holds a single mutex for its whole duration. Operations
//! are short, so the cache favours strict LRU order over parallelism.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::list::{Handle, LinkedSlab};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::traits::EvictionCache;

type SizeFn<K, V> = Box<dyn Fn(&K, &V) -> u64 + Send + Sync>;
type Hook<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

struct Entry<K, V> {
    key: K,
    value: V,
}

struct Inner<K, V> {
    map: HashMap<K, Handle>,
    order: LinkedSlab<Entry<K, V>>,
    size: u64,
}

/// A thread-safe, size-bounded LRU cache.
///
/// # Example
///
/// ```
/// use eventum_cache::lru::LruCache;
///
/// let cache = LruCache::new(2);
/// cache.put("a", 1);
/// cache.put("b", 2);
/// assert_eq!(cache.try_get(&"a"), Some(1));
///
/// // Adding a third item evicts "b" (least recently used)
/// cache.put("c", 3);
/// assert_eq!(cache.try_get(&"b"), None);
/// ```
pub struct LruCache<K, V> {
    /// Maximum total size.
    capacity: u64,
    /// Entries and recency order.
    inner: Mutex<Inner<K, V>>,
    /// Computes an entry's share of the capacity.
    calculate_item_size: SizeFn<K, V>,
    /// Fired when a new key is stored.
    on_put: Option<Hook<K, V>>,
    /// Fired when an entry leaves the cache.
    on_remove: Option<Hook<K, V>>,
    /// Statistics.
    stats: Option<CacheStats>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// Creates a new LRU cache where every entry has size one.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let initial = usize::try_from(capacity.min(4096)).unwrap_or(4096);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                map: HashMap::with_capacity(initial),
                order: LinkedSlab::with_capacity(initial),
                size: 0,
            }),
            calculate_item_size: Box::new(|_, _| 1),
            on_put: None,
            on_remove: None,
            stats: Some(CacheStats::new()),
        }
    }

    /// Sets the function computing each entry's size.
    #[must_use]
    pub fn with_item_size(mut self, size: impl Fn(&K, &V) -> u64 + Send + Sync + 'static) -> Self {
        self.calculate_item_size = Box::new(size);
        self
    }

    /// Sets a hook fired when a new key is stored. Updates do not fire it.
    #[must_use]
    pub fn with_on_put(mut self, hook: impl Fn(&K, &V) + Send + Sync + 'static) -> Self {
        self.on_put = Some(Box::new(hook));
        self
    }

    /// Sets a hook fired for every evicted, removed or cleared entry.
    #[must_use]
    pub fn with_on_remove(mut self, hook: impl Fn(&K, &V) + Send + Sync + 'static) -> Self {
        self.on_remove = Some(Box::new(hook));
        self
    }

    /// Enables or disables statistics collection.
    #[must_use]
    pub fn with_stats(mut self, enable: bool) -> Self {
        self.stats = enable.then(CacheStats::new);
        self
    }

    /// Returns the maximum total size.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the current total size of all entries.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the cache contains the given key without updating recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Gets a copy of the value for the given key.
    ///
    /// This marks the entry as most recently used.
    pub fn try_get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let found = match inner.map.get(key).copied() {
            Some(handle) => {
                inner.order.move_to_back(handle);
                inner.order.get(handle).map(|entry| entry.value.clone())
            }
            None => None,
        };
        if let Some(stats) = &self.stats {
            stats.record_lookup(found.is_some());
        }
        found
    }

    /// Inserts or replaces a value, evicting least recently used entries
    /// until it fits. Returns `value`.
    pub fn put(&self, key: K, value: V) -> V {
        self.put_with(key, value, |_, v| v.clone(), |_, _, v| v.clone())
    }

    /// Inserts `add(&key, &user_data)` or replaces the current value with
    /// `update(&key, &current, &user_data)`. Returns the stored value.
    pub fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        let mut inner = self.inner.lock();

        let existing = inner
            .map
            .remove(&key)
            .and_then(|handle| inner.order.remove(handle));
        if let Some(old) = existing {
            inner.size = inner
                .size
                .saturating_sub((self.calculate_item_size)(&old.key, &old.value));

            let value = update(&key, &old.value, &user_data);
            let item_size = (self.calculate_item_size)(&key, &value);
            self.ensure_capacity(&mut inner, item_size);
            self.link(&mut inner, key, value.clone(), item_size);
            if let Some(stats) = &self.stats {
                stats.record_update();
            }
            return value;
        }

        let value = add(&key, &user_data);
        let item_size = (self.calculate_item_size)(&key, &value);
        self.ensure_capacity(&mut inner, item_size);
        if let Some(hook) = &self.on_put {
            hook(&key, &value);
        }
        self.link(&mut inner, key, value.clone(), item_size);
        if let Some(stats) = &self.stats {
            stats.record_insert();
        }
        value
    }

    /// Removes an entry from the cache.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let handle = inner.map.remove(key)?;
        let entry = inner.order.remove(handle)?;
        inner.size = inner
            .size
            .saturating_sub((self.calculate_item_size)(&entry.key, &entry.value));
        if let Some(hook) = &self.on_remove {
            hook(&entry.key, &entry.value);
        }
        if let Some(stats) = &self.stats {
            stats.record_removal();
        }
        Some(entry.value)
    }

    /// Clears all entries from the cache, firing `on_remove` for each.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.size = 0;
        for entry in inner.order.drain() {
            if let Some(hook) = &self.on_remove {
                hook(&entry.key, &entry.value);
            }
        }
    }

    /// Returns cache statistics, if enabled.
    pub fn stats(&self) -> Option<CacheStatsSnapshot> {
        self.stats.as_ref().map(CacheStats::snapshot)
    }

    /// Returns keys from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .lock()
            .order
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    fn link(&self, inner: &mut Inner<K, V>, key: K, value: V, item_size: u64) {
        let handle = inner.order.push_back(Entry {
            key: key.clone(),
            value,
        });
        inner.map.insert(key, handle);
        inner.size = inner.size.saturating_add(item_size);
    }

    /// Evicts from the least recently used end until `incoming` fits or
    /// the cache is empty.
    fn ensure_capacity(&self, inner: &mut Inner<K, V>, incoming: u64) {
        while inner.size.saturating_add(incoming) > self.capacity {
            let Some(entry) = inner.order.pop_front() else {
                break;
            };
            inner.map.remove(&entry.key);
            inner.size = inner
                .size
                .saturating_sub((self.calculate_item_size)(&entry.key, &entry.value));
            if let Some(hook) = &self.on_remove {
                hook(&entry.key, &entry.value);
            }
            if let Some(stats) = &self.stats {
                stats.record_eviction();
            }
        }
    }
}

impl<K, V> EvictionCache<K, V> for LruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn try_get(&self, key: &K) -> Option<V> {
        LruCache::try_get(self, key)
    }

    fn put(&self, key: K, value: V) -> V {
        LruCache::put(self, key, value)
    }

    fn put_with<U>(
        &self,
        key: K,
        user_data: U,
        add: impl FnOnce(&K, &U) -> V,
        update: impl FnOnce(&K, &V, &U) -> V,
    ) -> V {
        LruCache::put_with(self, key, user_data, add, update)
    }

    fn remove(&self, key: &K) -> Option<V> {
        LruCache::remove(self, key)
    }

    fn clear(&self) {
        LruCache::clear(self);
    }

    fn len(&self) -> usize {
        LruCache::len(self)
    }
}

impl<K, V> std::fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("size", &inner.size)
            .field("len", &inner.map.len())
            .finish()
    }
}
