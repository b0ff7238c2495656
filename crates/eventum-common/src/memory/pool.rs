//! Bounded object pool.
//!
//! Object pools keep expensive-to-build instances (storage reader sessions,
//! scratch buffers) in circulation instead of rebuilding them per call:
//!
//! - `get` prefers a pooled instance and only manufactures a new one while
//!   fewer than `max_count` instances are alive
//! - `return_item` puts an instance back into circulation
//! - `rent` wraps both in a [`PoolLease`] that returns the instance on drop
//!
//! # Disposal
//!
//! Disposal is cooperative. `mark_for_disposal` destroys every instance that
//! is currently pooled; instances still leased out are destroyed as they come
//! back. Whoever destroys the last live instance fires the `on_pool_disposed`
//! callback, exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use crate::error::{EventumError, EventumResult};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Disposer<T> = Box<dyn Fn(T) + Send + Sync>;
type DisposedCallback = Box<dyn FnOnce() + Send>;

/// A bounded pool of reusable objects.
///
/// # Example
///
/// ```rust
/// use eventum_common::memory::ObjectPool;
///
/// let pool = ObjectPool::new("buffers", 1, 4, || Vec::<u8>::with_capacity(1024)).unwrap();
///
/// {
///     let mut buf = pool.rent().unwrap();
///     buf.extend_from_slice(b"hello");
/// } // returned to the pool here
///
/// assert_eq!(pool.available(), 1);
/// ```
pub struct ObjectPool<T> {
    /// Diagnostic name.
    name: String,
    /// Maximum number of live objects.
    max_count: usize,
    /// Objects available for lease.
    items: SegQueue<T>,
    /// Number of live objects, pooled or leased.
    count: AtomicUsize,
    /// Set once disposal starts.
    disposing: AtomicBool,
    /// Set once `on_pool_disposed` has been claimed.
    disposed: AtomicBool,
    /// Builds new objects.
    factory: Factory<T>,
    /// Destroys objects on disposal.
    dispose: Option<Disposer<T>>,
    /// Fired once when the last live object is destroyed.
    on_pool_disposed: Mutex<Option<DisposedCallback>>,
}

impl<T> ObjectPool<T> {
    /// Creates a new pool and pre-populates it with `initial_count` objects.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `max_count` is zero or smaller than
    /// `initial_count`.
    pub fn new(
        name: impl Into<String>,
        initial_count: usize,
        max_count: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> EventumResult<Self> {
        let name = name.into();
        if max_count == 0 {
            return Err(EventumError::invalid_argument(format!(
                "object pool '{name}' needs a positive max count"
            )));
        }
        if initial_count > max_count {
            return Err(EventumError::invalid_argument(format!(
                "object pool '{name}' initial count {initial_count} exceeds max count {max_count}"
            )));
        }

        let items = SegQueue::new();
        for _ in 0..initial_count {
            items.push(factory());
        }

        Ok(Self {
            name,
            max_count,
            items,
            count: AtomicUsize::new(initial_count),
            disposing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            factory: Box::new(factory),
            dispose: None,
            on_pool_disposed: Mutex::new(None),
        })
    }

    /// Sets the function used to destroy objects during disposal.
    #[must_use]
    pub fn with_dispose(mut self, dispose: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.dispose = Some(Box::new(dispose));
        self
    }

    /// Sets the callback fired once all objects have been destroyed.
    #[must_use]
    pub fn with_on_pool_disposed(self, callback: impl FnOnce() + Send + 'static) -> Self {
        *self.on_pool_disposed.lock() = Some(Box::new(callback));
        self
    }

    /// Returns the pool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the maximum number of live objects.
    #[inline]
    #[must_use]
    pub const fn max_count(&self) -> usize {
        self.max_count
    }

    /// Returns the number of live objects, pooled or leased.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns the number of objects waiting in the pool.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.items.len()
    }

    /// Returns true once disposal has started.
    #[inline]
    #[must_use]
    pub fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::Acquire)
    }

    /// Takes an object out of the pool, manufacturing one if none is pooled.
    ///
    /// # Errors
    ///
    /// Returns `PoolDisposing` after disposal has started and
    /// `PoolMaxLimitReached` when `max_count` objects are already alive.
    pub fn get(&self) -> EventumResult<T> {
        if self.is_disposing() {
            return Err(self.disposing_error());
        }

        if let Some(item) = self.items.pop() {
            return Ok(item);
        }

        let live = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if live > self.max_count {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return Err(EventumError::PoolMaxLimitReached {
                pool: self.name.clone(),
                max_count: self.max_count,
            });
        }

        if self.is_disposing() {
            self.count.fetch_sub(1, Ordering::AcqRel);
            self.try_destroy_pool();
            return Err(self.disposing_error());
        }

        // Built outside any lock so other leases are not held up.
        Ok((self.factory)())
    }

    /// Puts an object back into circulation.
    ///
    /// During disposal the object is destroyed instead.
    pub fn return_item(&self, item: T) {
        self.items.push(item);
        if self.is_disposing() {
            self.try_destroy_pool();
        }
    }

    /// Leases an object that returns itself to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectPool::get`].
    pub fn rent(&self) -> EventumResult<PoolLease<'_, T>> {
        let item = self.get()?;
        Ok(PoolLease {
            pool: self,
            item: Some(item),
        })
    }

    /// Starts disposal.
    ///
    /// Pooled objects are destroyed immediately, leased ones when they are
    /// returned. Calling this more than once has no further effect.
    pub fn mark_for_disposal(&self) {
        self.disposing.store(true, Ordering::Release);
        self.try_destroy_pool();
    }

    /// Alias for [`ObjectPool::mark_for_disposal`].
    pub fn dispose(&self) {
        self.mark_for_disposal();
    }

    fn try_destroy_pool(&self) {
        while let Some(item) = self.items.pop() {
            if let Some(dispose) = &self.dispose {
                dispose(item);
            }
            self.count.fetch_sub(1, Ordering::AcqRel);
        }

        if self.count.load(Ordering::Acquire) == 0
            && self
                .disposed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::debug!(pool = %self.name, "object pool disposed");
            if let Some(callback) = self.on_pool_disposed.lock().take() {
                callback();
            }
        }
    }

    fn disposing_error(&self) -> EventumError {
        EventumError::PoolDisposing {
            pool: self.name.clone(),
        }
    }
}

impl<T> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        self.mark_for_disposal();
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("max_count", &self.max_count)
            .field("count", &self.count())
            .field("available", &self.available())
            .field("disposing", &self.is_disposing())
            .finish()
    }
}

/// An object leased from an [`ObjectPool`].
///
/// The object goes back to the pool when the lease is dropped, including
/// during unwinding.
pub struct PoolLease<'a, T> {
    pool: &'a ObjectPool<T>,
    item: Option<T>,
}

impl<T> PoolLease<'_, T> {
    /// Returns the pool this lease came from.
    #[must_use]
    pub fn pool(&self) -> &ObjectPool<T> {
        self.pool
    }
}

impl<T> std::ops::Deref for PoolLease<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        match &self.item {
            Some(item) => item,
            None => unreachable!("lease is only emptied on drop"),
        }
    }
}

impl<T> std::ops::DerefMut for PoolLease<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("lease is only emptied on drop"),
        }
    }
}

impl<T> Drop for PoolLease<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.return_item(item);
        }
    }
}

impl<T> std::fmt::Debug for PoolLease<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("pool", &self.pool.name)
            .finish()
    }
}
