//! Fixed-capacity FIFO queue that drops its oldest entry when full.

use std::collections::VecDeque;

/// A FIFO queue holding at most `max_capacity` items.
///
/// Enqueueing into a full queue silently discards the oldest item.
///
/// # Example
///
/// ```rust
/// use eventum_common::collections::BoundedQueue;
///
/// let mut queue = BoundedQueue::new(2);
/// queue.enqueue(1);
/// queue.enqueue(2);
/// queue.enqueue(3);
///
/// assert_eq!(queue.dequeue(), Some(2));
/// assert_eq!(queue.dequeue(), Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    max_capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue.
    ///
    /// # Panics
    ///
    /// Panics if `max_capacity` is 0.
    #[must_use]
    pub fn new(max_capacity: usize) -> Self {
        assert!(max_capacity > 0, "max_capacity must be greater than 0");
        Self {
            items: VecDeque::with_capacity(max_capacity),
            max_capacity,
        }
    }

    /// Returns the maximum number of items.
    #[inline]
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Returns the number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item, discarding the oldest one if the queue is full.
    ///
    /// Returns the discarded item, if any.
    pub fn enqueue(&mut self, item: T) -> Option<T> {
        let dropped = if self.items.len() >= self.max_capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        dropped
    }

    /// Removes and returns the oldest item.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Returns the oldest item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
