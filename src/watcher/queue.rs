//! Deduplicating event queue shared by all emitters feeding one dispatcher.
//!
//! The native facility can report the identical change more than once in
//! rapid succession. The queue tracks the last item enqueued and not yet
//! dequeued; a `put` of a structurally equal item is silently dropped rather
//! than queued twice.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::events::FileSystemEvent;
use super::observer::WatchedPath;

/// What the dispatcher dequeues: an event with its originating watch, or
/// the discriminated stop marker that wakes the consumer during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
    Event {
        event: FileSystemEvent,
        watch: WatchedPath,
    },
    Stop,
}

struct QueueState {
    items: VecDeque<QueueEntry>,
    /// Last event enqueued and not yet dequeued; the dedup tail.
    pending_tail: Option<(FileSystemEvent, WatchedPath)>,
}

/// Concurrent FIFO that collapses an item identical to the pending tail.
pub struct EventQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                pending_tail: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueue `(event, watch)` unless it equals the pending tail item.
    pub fn put(&self, event: FileSystemEvent, watch: WatchedPath) {
        let mut state = self.state.lock();
        if state
            .pending_tail
            .as_ref()
            .is_some_and(|(e, w)| *e == event && *w == watch)
        {
            crate::debug_event!("queue", "skipped repeat", "{event:?}");
            return;
        }
        state.pending_tail = Some((event.clone(), watch.clone()));
        state.items.push_back(QueueEntry::Event { event, watch });
        drop(state);
        self.ready.notify_one();
    }

    /// Enqueue the stop marker. Always queued; never part of dedup tracking.
    pub(crate) fn put_stop(&self) {
        let mut state = self.state.lock();
        state.items.push_back(QueueEntry::Stop);
        drop(state);
        self.ready.notify_one();
    }

    /// Block until an entry is available and dequeue it. Dequeuing the item
    /// tracked as the pending tail clears the tracking.
    pub fn take(&self) -> QueueEntry {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.items.pop_front() {
                if let QueueEntry::Event { event, watch } = &entry {
                    if state
                        .pending_tail
                        .as_ref()
                        .is_some_and(|(e, w)| e == event && w == watch)
                    {
                        state.pending_tail = None;
                    }
                }
                return entry;
            }
            self.ready.wait(&mut state);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
