//! Collection types used on hot paths.
//!
//! - [`BoundedQueue`]: FIFO that drops its oldest entry when full
//! - [`PairingHeap`]: mergeable min-heap backing the timer scheduler

mod bounded_queue;
mod pairing_heap;

pub use bounded_queue::BoundedQueue;
pub use pairing_heap::{Compare, FnCompare, NaturalOrder, PairingHeap};
