//! Pairing heap.
//!
//! A self-adjusting mergeable heap: `add` melds a singleton into the root in
//! O(1) and `delete_min` re-pairs the root's children in two passes
//! (left-to-right pairing, then right-to-left melding) for amortized
//! O(log n).
//!
//! Nodes live in an arena indexed by slot number. Slots freed by
//! `delete_min` are recycled by later `add`s, so a heap in steady state
//! does not allocate.

use std::cmp::Ordering;

/// Ordering used by a [`PairingHeap`].
pub trait Compare<T> {
    /// Compares two items.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Orders items by their `Ord` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> Compare<T> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Orders items with a closure.
#[derive(Clone, Copy)]
pub struct FnCompare<F>(pub F);

impl<T, F> Compare<T> for FnCompare<F>
where
    F: Fn(&T, &T) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.0)(a, b)
    }
}

struct Node<T> {
    item: Option<T>,
    child: Option<usize>,
    sibling: Option<usize>,
}

/// A min-heap with O(1) insert and amortized O(log n) delete-min.
///
/// # Example
///
/// ```rust
/// use eventum_common::collections::PairingHeap;
///
/// let mut heap = PairingHeap::new();
/// heap.add(5);
/// heap.add(1);
/// heap.add(3);
///
/// assert_eq!(heap.find_min(), Some(&1));
/// assert_eq!(heap.delete_min(), Some(1));
/// assert_eq!(heap.delete_min(), Some(3));
/// ```
pub struct PairingHeap<T, C = NaturalOrder> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    scratch: Vec<usize>,
    root: Option<usize>,
    len: usize,
    compare: C,
}

impl<T: Ord> PairingHeap<T> {
    /// Creates an empty heap ordered by `Ord`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparer(NaturalOrder)
    }
}

impl<T: Ord> Default for PairingHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, F> PairingHeap<T, FnCompare<F>>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an empty heap ordered by `compare`.
    #[must_use]
    pub fn with_compare_fn(compare: F) -> Self {
        Self::with_comparer(FnCompare(compare))
    }
}

impl<T, C: Compare<T>> PairingHeap<T, C> {
    /// Creates an empty heap ordered by `compare`.
    #[must_use]
    pub fn with_comparer(compare: C) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            scratch: Vec::new(),
            root: None,
            len: 0,
            compare,
        }
    }

    /// Returns the number of items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the heap holds no items.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts an item.
    pub fn add(&mut self, item: T) {
        let node = self.allocate(item);
        self.root = Some(match self.root {
            Some(root) => self.meld(root, node),
            None => node,
        });
        self.len += 1;
    }

    /// Returns the smallest item.
    #[must_use]
    pub fn find_min(&self) -> Option<&T> {
        self.root.and_then(|root| self.nodes[root].item.as_ref())
    }

    /// Removes and returns the smallest item.
    pub fn delete_min(&mut self) -> Option<T> {
        let root = self.root?;
        let item = self.nodes[root].item.take();
        let mut next = self.nodes[root].child.take();
        self.free.push(root);
        self.len -= 1;

        let mut children = std::mem::take(&mut self.scratch);
        children.clear();
        while let Some(child) = next {
            next = self.nodes[child].sibling.take();
            children.push(child);
        }

        // Pass one: meld neighbours left to right.
        let mut paired = 0;
        let mut i = 0;
        while i < children.len() {
            children[paired] = if i + 1 < children.len() {
                self.meld(children[i], children[i + 1])
            } else {
                children[i]
            };
            paired += 1;
            i += 2;
        }
        children.truncate(paired);

        // Pass two: fold the pairs right to left.
        self.root = children.iter().rev().copied().reduce(|acc, node| self.meld(node, acc));

        self.scratch = children;
        item
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    fn allocate(&mut self, item: T) -> usize {
        let node = Node {
            item: Some(item),
            child: None,
            sibling: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Links two roots, returning the new root. Ties keep `a` on top.
    fn meld(&mut self, a: usize, b: usize) -> usize {
        let (parent, child) = if self.precedes(a, b) { (a, b) } else { (b, a) };
        self.nodes[child].sibling = self.nodes[parent].child;
        self.nodes[parent].child = Some(child);
        parent
    }

    fn precedes(&self, a: usize, b: usize) -> bool {
        match (&self.nodes[a].item, &self.nodes[b].item) {
            (Some(x), Some(y)) => self.compare.compare(x, y) != Ordering::Greater,
            _ => true,
        }
    }
}

impl<T, C> std::fmt::Debug for PairingHeap<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingHeap")
            .field("len", &self.len)
            .field("slots", &self.nodes.len())
            .field("free_slots", &self.free.len())
            .finish()
    }
}
