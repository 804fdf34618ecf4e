//! Indexed priority queue.

use slab::Slab;

/// A binary heap cross-indexed with a slab, supporting extraction of the
/// lowest key and removal of arbitrary entries.
///
/// Each heap item holds the user key, a unique insertion epoch and the index
/// of a slab entry. Each slab entry holds the value together with the current
/// position of its item in the heap, which is what makes *O*(log(*N*))
/// removal possible.
///
/// Same-key entries are pulled in insertion order since the epoch is used as
/// a secondary sort key.
pub(crate) struct PriorityQueue<K, V>
where
    K: Copy + Ord,
{
    heap: Vec<Item<K>>,
    slab: Slab<Entry<V>>,
    next_epoch: u64,
}

impl<K: Copy + Ord, V> PriorityQueue<K, V> {
    /// Creates an empty `PriorityQueue`.
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty `PriorityQueue` with at least the specified capacity.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            slab: Slab::with_capacity(capacity),
            next_epoch: 0,
        }
    }

    /// Returns the number of key-value pairs in the queue.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Checks whether the queue is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a new key-value pair and returns a handle that can later be
    /// used to remove it.
    pub(crate) fn insert(&mut self, key: K, value: V) -> InsertKey {
        let epoch = self.next_epoch;
        assert_ne!(epoch, u64::MAX);
        self.next_epoch += 1;

        let heap_idx = self.heap.len();
        let slab_idx = self.slab.insert(Entry { value, heap_idx });
        let item = Item {
            key: UniqueKey { key, epoch },
            slab_idx,
        };
        self.heap.push(item);
        self.sift_up(item, heap_idx);

        InsertKey { slab_idx, epoch }
    }

    /// Pulls the value with the lowest key, or the earliest inserted one
    /// among several equal lowest keys.
    pub(crate) fn pull(&mut self) -> Option<(K, V)> {
        let top = *self.heap.first()?;
        let entry = self.slab.remove(top.slab_idx);

        let last = self.heap.pop().unwrap();
        if last.slab_idx != top.slab_idx {
            self.sift_down(last, 0);
        }

        Some((top.key.key, entry.value))
    }

    /// Returns the lowest key without removing it.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.first().map(|item| &item.key.key)
    }

    /// Returns the key and value associated to an insertion handle if the
    /// pair is still in the queue.
    pub(crate) fn get(&self, insert_key: InsertKey) -> Option<(&K, &V)> {
        let entry = self.slab.get(insert_key.slab_idx)?;
        let item = &self.heap[entry.heap_idx];
        if item.key.epoch != insert_key.epoch {
            return None;
        }

        Some((&item.key.key, &entry.value))
    }

    /// Removes the key-value pair associated to an insertion handle.
    ///
    /// Returns the value if the pair was still in the queue. A handle
    /// obtained from another queue is a logic error and may remove an
    /// arbitrary pair.
    pub(crate) fn remove(&mut self, insert_key: InsertKey) -> Option<V> {
        let heap_idx = match self.slab.get(insert_key.slab_idx) {
            Some(entry) if self.heap[entry.heap_idx].key.epoch == insert_key.epoch => {
                entry.heap_idx
            }
            _ => return None,
        };

        let last = self.heap.pop().unwrap();
        if let Some(vacant) = self.heap.get(heap_idx) {
            if last.key < vacant.key {
                self.sift_up(last, heap_idx);
            } else {
                self.sift_down(last, heap_idx);
            }
        }

        Some(self.slab.remove(insert_key.slab_idx).value)
    }

    /// Moves `item` up from `heap_idx` while its parent has a larger key.
    fn sift_up(&mut self, item: Item<K>, heap_idx: usize) {
        let mut idx = heap_idx;

        while idx != 0 {
            let parent_idx = (idx - 1) / 2;
            let parent = self.heap[parent_idx];
            if item.key >= parent.key {
                break;
            }
            self.place(parent, idx);
            idx = parent_idx;
        }

        self.place(item, idx);
    }

    /// Moves `item` down from `heap_idx` while a child has a smaller key.
    fn sift_down(&mut self, item: Item<K>, heap_idx: usize) {
        let mut idx = heap_idx;

        loop {
            let mut child_idx = 2 * idx + 1;
            if child_idx >= self.heap.len() {
                break;
            }
            if let Some(sibling) = self.heap.get(child_idx + 1) {
                if sibling.key < self.heap[child_idx].key {
                    child_idx += 1;
                }
            }
            let child = self.heap[child_idx];
            if item.key <= child.key {
                break;
            }
            self.place(child, idx);
            idx = child_idx;
        }

        self.place(item, idx);
    }

    /// Stores `item` at `heap_idx` and updates the back-index of its entry.
    #[inline]
    fn place(&mut self, item: Item<K>, heap_idx: usize) {
        self.heap[heap_idx] = item;
        self.slab[item.slab_idx].heap_idx = heap_idx;
    }
}

/// Heap item.
#[derive(Copy, Clone)]
struct Item<K: Copy> {
    key: UniqueKey<K>,
    slab_idx: usize,
}

/// Slab entry.
struct Entry<V> {
    value: V,
    heap_idx: usize,
}

/// A handle returned on insertion, valid until the pair leaves the queue.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct InsertKey {
    slab_idx: usize,
    epoch: u64,
}

/// User key complemented by a unique epoch.
///
/// The derived `Ord` is lexicographic, so `key` must stay declared before
/// `epoch`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueKey<K: Copy> {
    key: K,
    epoch: u64,
}
