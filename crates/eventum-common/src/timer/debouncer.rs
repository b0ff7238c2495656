//! Trigger-then-flush debouncer.
//!
//! Callers `trigger` as often as they like; every `interval` the debouncer
//! checks whether it was triggered since the last tick and, if so, runs the
//! flush once. An idle debouncer never flushes. A flush that reports
//! failure leaves the debouncer triggered, so the next tick runs it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::scheduler::{TaskHandle, TimerScheduler};
use crate::error::EventumResult;

type Flush = Box<dyn Fn(&CancellationToken) -> bool + Send + Sync>;

struct Inner {
    interval: Duration,
    triggered: AtomicBool,
    flush: Flush,
    token: CancellationToken,
    scheduler: Arc<TimerScheduler>,
    next_tick: Mutex<Option<TaskHandle>>,
}

/// Runs a flush at most once per interval, and only after a trigger.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use eventum_common::timer::{Debouncer, TimerScheduler};
/// use tokio_util::sync::CancellationToken;
///
/// let scheduler = Arc::new(TimerScheduler::start("checkpoints").unwrap());
/// let debouncer = Debouncer::start(
///     Duration::from_millis(50),
///     scheduler,
///     CancellationToken::new(),
///     |_token| {
///         println!("flushing");
///         true
///     },
/// )
/// .unwrap();
///
/// debouncer.trigger();
/// ```
pub struct Debouncer {
    inner: Arc<Inner>,
}

impl Debouncer {
    /// Starts ticking every `interval` on `scheduler`.
    ///
    /// The flush receives a child of `token` and returns true on success;
    /// cancelling `token` stops the debouncer. An interval too large to schedule disables ticking, so
    /// only [`Debouncer::flush_now`] will flush.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the scheduler has been shut down.
    pub fn start(
        interval: Duration,
        scheduler: Arc<TimerScheduler>,
        token: CancellationToken,
        flush: impl Fn(&CancellationToken) -> bool + Send + Sync + 'static,
    ) -> EventumResult<Self> {
        let inner = Arc::new(Inner {
            interval,
            triggered: AtomicBool::new(false),
            flush: Box::new(flush),
            token: token.child_token(),
            scheduler,
            next_tick: Mutex::new(None),
        });
        schedule_tick(&inner)?;
        Ok(Self { inner })
    }

    /// Returns the tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Marks the debouncer dirty so the next tick flushes.
    #[inline]
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::Release);
    }

    /// Returns true if a trigger is waiting for the next tick.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Flushes on the calling thread if triggered, without waiting for a tick.
    ///
    /// Returns true if the flush ran, whether or not it succeeded.
    pub fn flush_now(&self) -> bool {
        tick(&self.inner)
    }

    /// Stops ticking. A flush already running is allowed to finish.
    pub fn cancel(&self) {
        self.inner.token.cancel();
        if let Some(handle) = self.inner.next_tick.lock().take() {
            handle.cancel();
        }
    }

    /// Returns true once the debouncer has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("interval", &self.inner.interval)
            .field("triggered", &self.is_triggered())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Runs the flush if triggered. Returns true if it ran.
fn tick(inner: &Inner) -> bool {
    if inner.token.is_cancelled() {
        return false;
    }
    if inner.triggered.swap(false, Ordering::AcqRel) {
        if !(inner.flush)(&inner.token) {
            inner.triggered.store(true, Ordering::Release);
        }
        true
    } else {
        false
    }
}

fn schedule_tick(inner: &Arc<Inner>) -> EventumResult<()> {
    if inner.token.is_cancelled() {
        return Ok(());
    }
    let Some(due) = Instant::now().checked_add(inner.interval) else {
        tracing::debug!(interval = ?inner.interval, "debouncer interval is unbounded, not ticking");
        return Ok(());
    };

    let weak: Weak<Inner> = Arc::downgrade(inner);
    let handle = inner.scheduler.schedule(due, move || {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        tick(&inner);
        if let Err(err) = schedule_tick(&inner) {
            tracing::warn!(error = %err, "debouncer could not schedule next tick");
        }
    })?;
    *inner.next_tick.lock() = Some(handle);
    Ok(())
}
