//! Watch registry and single-consumer event dispatcher.
//!
//! The observer owns the emitter lifecycle (one emitter per distinct
//! [`WatchedPath`]) and the handler registry, and runs the one thread that
//! drains the shared event queue and fans events out to the handlers
//! registered for the originating watch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::emitter::{EmitterHandle, spawn_emitter};
use super::error::WatchError;
use super::handler::EventHandler;
use super::queue::{EventQueue, QueueEntry};

/// A `(path, recursive)` pair under active observation. Immutable; equality
/// and hashing cover both fields, so the same path watched recursively and
/// non-recursively are distinct registry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedPath {
    path: PathBuf,
    recursive: bool,
}

impl WatchedPath {
    pub fn new(path: PathBuf, recursive: bool) -> Self {
        Self { path, recursive }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }
}

/// Shared handle to a registered event handler. Identity (for removal and
/// the dispatcher's membership re-check) is `Arc` pointer identity.
pub type HandlerRef = Arc<dyn EventHandler>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<WatchedPath, Vec<HandlerRef>>,
    emitters: HashMap<WatchedPath, EmitterHandle>,
}

/// Schedules watches, starts emitters, and dispatches queued events to the
/// handlers registered per watch.
pub struct Observer {
    queue: Arc<EventQueue>,
    registry: Arc<Mutex<Registry>>,
    settle_delay: Duration,
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Observer {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            queue: Arc::new(EventQueue::new()),
            registry: Arc::new(Mutex::new(Registry::default())),
            settle_delay,
            running: Arc::new(AtomicBool::new(false)),
            dispatcher: None,
        }
    }

    /// Register `handler` for a watch on `path`, starting an emitter if this
    /// is the first schedule of that `(path, recursive)` pair. Scheduling
    /// the same pair again reuses the running emitter and only adds the
    /// handler.
    pub fn schedule(
        &self,
        handler: HandlerRef,
        path: &Path,
        recursive: bool,
    ) -> Result<WatchedPath, WatchError> {
        let watch = WatchedPath::new(path.to_path_buf(), recursive);
        let mut registry = self.registry.lock();

        if !registry.emitters.contains_key(&watch) {
            let emitter = spawn_emitter(Arc::clone(&self.queue), watch.clone(), self.settle_delay)?;
            registry.emitters.insert(watch.clone(), emitter);
            crate::log_event!("observer", "watching", "{}", watch.path().display());
        }
        registry.handlers.entry(watch.clone()).or_default().push(handler);
        Ok(watch)
    }

    /// Stop and join the watch's emitter and drop all its handlers.
    pub fn unschedule(&self, watch: &WatchedPath) -> Result<(), WatchError> {
        let mut emitter = {
            let mut registry = self.registry.lock();
            registry.handlers.remove(watch);
            registry
                .emitters
                .remove(watch)
                .ok_or_else(|| WatchError::NotScheduled {
                    path: watch.path().to_path_buf(),
                    recursive: watch.is_recursive(),
                })?
        };
        // Joining the emitter outside the registry lock; the dispatcher may
        // hold the lock while fanning out a queued event.
        emitter.stop();
        crate::log_event!("observer", "unscheduled", "{}", watch.path().display());
        Ok(())
    }

    /// Add another handler to a live watch.
    pub fn add_handler(&self, handler: HandlerRef, watch: &WatchedPath) -> Result<(), WatchError> {
        let mut registry = self.registry.lock();
        if !registry.emitters.contains_key(watch) {
            return Err(WatchError::NotScheduled {
                path: watch.path().to_path_buf(),
                recursive: watch.is_recursive(),
            });
        }
        registry.handlers.entry(watch.clone()).or_default().push(handler);
        Ok(())
    }

    /// Remove a handler from a watch. Safe concurrently with dispatch: the
    /// dispatcher re-checks membership immediately before each invocation,
    /// so a removed handler is never invoked afterwards.
    pub fn remove_handler(&self, handler: &HandlerRef, watch: &WatchedPath) {
        let mut registry = self.registry.lock();
        if let Some(handlers) = registry.handlers.get_mut(watch) {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    /// Whether the watch's emitter thread is still running. Emitters stop on
    /// fatal native errors without being unscheduled; re-registration is the
    /// owner's explicit decision.
    pub fn emitter_alive(&self, watch: &WatchedPath) -> bool {
        self.registry
            .lock()
            .emitters
            .get(watch)
            .is_some_and(EmitterHandle::is_alive)
    }

    /// Currently scheduled watches.
    pub fn watches(&self) -> Vec<WatchedPath> {
        self.registry.lock().emitters.keys().cloned().collect()
    }

    /// Start the dispatcher thread. Emitters already run from `schedule`;
    /// their events queue up until this is called.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.dispatcher.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        let queue = Arc::clone(&self.queue);
        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let dispatcher = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || dispatch_loop(queue, registry, running))
            .map_err(|source| WatchError::Spawn {
                name: "dispatcher",
                source,
            })?;
        self.dispatcher = Some(dispatcher);
        crate::log_event!("observer", "started");
        Ok(())
    }

    /// Shut everything down: wake the dispatcher with the stop marker, join
    /// it, then stop and join every emitter and clear the registry.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.put_stop();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }

        let mut emitters: Vec<EmitterHandle> = {
            let mut registry = self.registry.lock();
            registry.handlers.clear();
            registry.emitters.drain().map(|(_, e)| e).collect()
        };
        for emitter in &mut emitters {
            emitter.stop();
        }
        crate::log_event!("observer", "stopped");
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    queue: Arc<EventQueue>,
    registry: Arc<Mutex<Registry>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let (event, watch) = match queue.take() {
            QueueEntry::Event { event, watch } => (event, watch),
            QueueEntry::Stop => break,
        };

        let snapshot = registry
            .lock()
            .handlers
            .get(&watch)
            .cloned()
            .unwrap_or_default();
        for handler in snapshot {
            // Membership re-check: a handler removed after the snapshot was
            // taken must not observe this event.
            let registered = registry
                .lock()
                .handlers
                .get(&watch)
                .is_some_and(|handlers| handlers.iter().any(|h| Arc::ptr_eq(h, &handler)));
            if registered {
                handler.dispatch(&event);
            }
        }
    }
}
