//! Timer scheduler.
//!
//! A single background thread fires scheduled tasks in due-time order. Due
//! times are kept in a [`PairingHeap`]; the thread sleeps on a condition
//! variable until the earliest task is due or a new task is scheduled.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::collections::PairingHeap;
use crate::error::{EventumError, EventumResult};

type Task = Box<dyn FnOnce() + Send>;

/// A task waiting in the scheduler.
struct ScheduledTask {
    /// When the task should run.
    due: Instant,
    /// Tie breaker so equal due times fire in scheduling order.
    seq: u64,
    /// Set by [`TaskHandle::cancel`].
    cancelled: Arc<AtomicBool>,
    /// The work itself.
    task: Task,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct State {
    heap: PairingHeap<ScheduledTask>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    next_seq: AtomicU64,
}

/// Handle to a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Prevents the task from running if it has not fired yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Fires tasks at their due time on a dedicated thread.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
/// use std::time::Duration;
/// use eventum_common::timer::TimerScheduler;
///
/// let scheduler = TimerScheduler::start("example").unwrap();
/// let (tx, rx) = mpsc::channel();
/// scheduler
///     .schedule_after(Duration::from_millis(5), move || tx.send(42).unwrap())
///     .unwrap();
///
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
/// ```
pub struct TimerScheduler {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerScheduler {
    /// Starts a scheduler thread named `name`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(name: impl Into<String>) -> EventumResult<Self> {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                heap: PairingHeap::new(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            next_seq: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(&worker_shared, &worker_name))?;

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Returns the scheduler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules `task` to run at `due`.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the scheduler has been shut down.
    pub fn schedule(
        &self,
        due: Instant,
        task: impl FnOnce() + Send + 'static,
    ) -> EventumResult<TaskHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let scheduled = ScheduledTask {
            due,
            seq: self.shared.next_seq.fetch_add(1, Ordering::Relaxed),
            cancelled: Arc::clone(&cancelled),
            task: Box::new(task),
        };

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(EventumError::Cancelled);
        }
        let becomes_first = state.heap.find_min().map_or(true, |first| due < first.due);
        state.heap.add(scheduled);
        drop(state);

        if becomes_first {
            self.shared.wakeup.notify_one();
        }

        Ok(TaskHandle { cancelled })
    }

    /// Schedules `task` to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the due time cannot be represented and
    /// `Cancelled` if the scheduler has been shut down.
    pub fn schedule_after(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> EventumResult<TaskHandle> {
        let due = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| EventumError::invalid_argument(format!("delay {delay:?} is too large")))?;
        self.schedule(due, task)
    }

    /// Returns the number of tasks waiting to fire, including cancelled ones.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// Stops the scheduler thread. Pending tasks are dropped without running.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.heap.clear();
        }
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            // A task may drop the last owner of the scheduler from its own thread.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!(scheduler = %self.name, "timer thread panicked");
            }
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

fn run(shared: &Shared, name: &str) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        match state.heap.find_min().map(|task| task.due) {
            Some(due) if due <= Instant::now() => {
                if let Some(task) = state.heap.delete_min() {
                    if !task.cancelled.load(Ordering::Acquire) {
                        fire(&mut state, task.task, name);
                    }
                }
            }
            Some(due) => {
                shared.wakeup.wait_until(&mut state, due);
            }
            None => {
                shared.wakeup.wait(&mut state);
            }
        }
    }
    tracing::debug!(scheduler = %name, "timer thread stopped");
}

fn fire(state: &mut MutexGuard<'_, State>, task: Task, name: &str) {
    MutexGuard::unlocked(state, || {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
            tracing::error!(scheduler = %name, "scheduled task panicked");
        }
    });
}
