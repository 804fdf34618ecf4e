//! Event queues keyed by sub-component.
//!
//! Every composite processor keeps one [`EventQueue`] holding exactly one
//! entry per sub-component, prioritized by the time of that sub-component's
//! next internal event. The queue implementation is pluggable through an
//! [`EventQueueFactory`]; [`QueueKind`] is the configuration value selecting
//! one of the built-in implementations.

use std::collections::HashMap;
use std::fmt;

use crate::model::ChildId;
use crate::time::MonotonicTime;
use crate::util::priority_queue::{InsertKey, PriorityQueue};

/// A time-priority associative structure keyed by sub-component.
pub trait EventQueue: Send {
    /// Inserts a key at the specified time.
    ///
    /// Enqueuing a key that is already queued is a logic error; use
    /// [`requeue()`](EventQueue::requeue) instead.
    fn enqueue(&mut self, key: ChildId, time: MonotonicTime);

    /// Removes and returns all keys sharing the minimal time, in ascending
    /// key order.
    fn dequeue_all(&mut self) -> Vec<ChildId>;

    /// Moves a key to a new time, inserting it if it is not queued.
    fn requeue(&mut self, key: ChildId, time: MonotonicTime);

    /// Returns the minimal time, if any key is queued.
    fn min_time(&self) -> Option<MonotonicTime>;

    /// Returns the time at which a key is queued.
    fn time_of(&self, key: ChildId) -> Option<MonotonicTime>;

    /// Returns the number of queued keys.
    fn len(&self) -> usize;

    /// Checks whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An [`EventQueue`] backed by an indexed binary heap.
///
/// All operations have *O*(log(*N*)) complexity, except for
/// [`dequeue_all()`](EventQueue::dequeue_all) which is *O*(*k* log(*N*)) for
/// *k* dequeued keys.
pub struct HeapEventQueue {
    heap: PriorityQueue<MonotonicTime, ChildId>,
    handles: HashMap<ChildId, InsertKey>,
}

impl HeapEventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty queue with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: PriorityQueue::with_capacity(capacity),
            handles: HashMap::with_capacity(capacity),
        }
    }
}

impl EventQueue for HeapEventQueue {
    fn enqueue(&mut self, key: ChildId, time: MonotonicTime) {
        let handle = self.heap.insert(time, key);
        let previous = self.handles.insert(key, handle);
        debug_assert!(previous.is_none(), "key {key} was enqueued twice");
    }

    fn dequeue_all(&mut self) -> Vec<ChildId> {
        let mut keys = Vec::new();
        let Some(&min_time) = self.heap.peek_key() else {
            return keys;
        };
        while self.heap.peek_key() == Some(&min_time) {
            // The loop condition guarantees a non-empty heap.
            let (_, key) = self.heap.pull().unwrap();
            self.handles.remove(&key);
            keys.push(key);
        }
        keys.sort_unstable();

        keys
    }

    fn requeue(&mut self, key: ChildId, time: MonotonicTime) {
        if let Some(handle) = self.handles.remove(&key) {
            self.heap.remove(handle);
        }
        self.enqueue(key, time);
    }

    fn min_time(&self) -> Option<MonotonicTime> {
        self.heap.peek_key().copied()
    }

    fn time_of(&self, key: ChildId) -> Option<MonotonicTime> {
        let handle = self.handles.get(&key)?;

        self.heap.get(*handle).map(|(time, _)| *time)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

impl Default for HeapEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HeapEventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapEventQueue")
            .field("len", &self.heap.len())
            .field("min_time", &self.min_time())
            .finish_non_exhaustive()
    }
}

/// An [`EventQueue`] backed by an unsorted vector.
///
/// Lookups are linear in the number of keys, which is competitive for
/// composites with a handful of sub-components.
#[derive(Clone, Debug, Default)]
pub struct ListEventQueue {
    entries: Vec<(ChildId, MonotonicTime)>,
}

impl ListEventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: ChildId) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }
}

impl EventQueue for ListEventQueue {
    fn enqueue(&mut self, key: ChildId, time: MonotonicTime) {
        debug_assert!(self.position(key).is_none(), "key {key} was enqueued twice");
        self.entries.push((key, time));
    }

    fn dequeue_all(&mut self) -> Vec<ChildId> {
        let Some(min_time) = self.min_time() else {
            return Vec::new();
        };
        let mut keys = Vec::new();
        self.entries.retain(|&(key, time)| {
            if time == min_time {
                keys.push(key);
                return false;
            }
            true
        });
        keys.sort_unstable();

        keys
    }

    fn requeue(&mut self, key: ChildId, time: MonotonicTime) {
        match self.position(key) {
            Some(idx) => self.entries[idx].1 = time,
            None => self.entries.push((key, time)),
        }
    }

    fn min_time(&self) -> Option<MonotonicTime> {
        self.entries.iter().map(|(_, time)| *time).min()
    }

    fn time_of(&self, key: ChildId) -> Option<MonotonicTime> {
        self.position(key).map(|idx| self.entries[idx].1)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Information passed to an [`EventQueueFactory`] about the composite that
/// will own the queue.
#[derive(Copy, Clone, Debug)]
pub struct QueueHint<'a> {
    /// Name of the composite.
    pub component: &'a str,
    /// Number of sub-components, i.e. the number of keys the queue will hold.
    pub children: usize,
}

/// A factory creating one event queue per composite processor.
pub trait EventQueueFactory: Send + Sync {
    /// Creates an empty queue.
    fn create(&self, hint: QueueHint<'_>) -> Box<dyn EventQueue>;
}

impl<F> EventQueueFactory for F
where
    F: Fn(QueueHint<'_>) -> Box<dyn EventQueue> + Send + Sync,
{
    fn create(&self, hint: QueueHint<'_>) -> Box<dyn EventQueue> {
        self(hint)
    }
}

/// Built-in event queue implementations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum QueueKind {
    /// [`HeapEventQueue`].
    #[default]
    Heap,
    /// [`ListEventQueue`].
    List,
}

impl EventQueueFactory for QueueKind {
    fn create(&self, hint: QueueHint<'_>) -> Box<dyn EventQueue> {
        match self {
            Self::Heap => Box::new(HeapEventQueue::with_capacity(hint.children)),
            Self::List => Box::new(ListEventQueue::new()),
        }
    }
}
