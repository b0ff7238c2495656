//! Arena-backed doubly-linked list.
//!
//! Nodes are addressed by slot index instead of pointer. Removed slots go on
//! a free list and are reused by the next push, so an LRU cache at steady
//! state reorders and replaces entries without allocating.

/// Slot index of a node in a [`LinkedSlab`].
pub(crate) type Handle = usize;

struct Slot<T> {
    value: Option<T>,
    prev: Option<Handle>,
    next: Option<Handle>,
}

/// Doubly-linked list stored in a `Vec`. The front is the oldest entry.
pub(crate) struct LinkedSlab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl<T> LinkedSlab<T> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn front(&self) -> Option<Handle> {
        self.head
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle).and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle).and_then(|slot| slot.value.as_mut())
    }

    /// Appends a value at the back (most recent end).
    pub(crate) fn push_back(&mut self, value: T) -> Handle {
        let slot = Slot {
            value: Some(value),
            prev: None,
            next: None,
        };
        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = slot;
                handle
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.link_back(handle);
        self.len += 1;
        handle
    }

    /// Moves a live node to the back.
    pub(crate) fn move_to_back(&mut self, handle: Handle) {
        if self.tail == Some(handle) {
            return;
        }
        self.unlink(handle);
        self.link_back(handle);
    }

    /// Removes a live node and returns its value.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        let value = self.slots.get_mut(handle)?.value.take()?;
        self.unlink(handle);
        self.free.push(handle);
        self.len -= 1;
        Some(value)
    }

    /// Removes and returns the front (oldest) value.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.remove(head)
    }

    /// Drains every value, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        while let Some(value) = self.pop_front() {
            values.push(value);
        }
        self.slots.clear();
        self.free.clear();
        values
    }

    /// Iterates from oldest to newest.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let handle = cursor?;
            let slot = &self.slots[handle];
            cursor = slot.next;
            slot.value.as_ref()
        })
    }

    fn link_back(&mut self, handle: Handle) {
        self.slots[handle].prev = self.tail;
        self.slots[handle].next = None;
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
    }

    fn unlink(&mut self, handle: Handle) {
        let prev = self.slots[handle].prev.take();
        let next = self.slots[handle].next.take();
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
    }
}
