//! Timers.
//!
//! - [`TimerScheduler`]: fires tasks at their due time on one thread
//! - [`Debouncer`]: periodic flush that only runs after a trigger

mod debouncer;
mod scheduler;

pub use debouncer::Debouncer;
pub use scheduler::{TaskHandle, TimerScheduler};
