//! Handler trait for subscribers to dispatched events.

use super::events::FileSystemEvent;

/// Receives events for the watches a subscriber registered on.
///
/// `dispatch` is the single entry point the dispatcher invokes; it calls the
/// catch-all first, then the hook matching the event variant. All hooks have
/// empty default bodies, so implementors override only what they care about.
///
/// Handlers are invoked synchronously from the dispatcher thread and must
/// not block; anything long-running belongs on the subscriber's own thread.
pub trait EventHandler: Send + Sync {
    /// Route `event` to the catch-all and the variant hook.
    fn dispatch(&self, event: &FileSystemEvent) {
        self.on_any_event(event);
        match event {
            FileSystemEvent::Created { .. } => self.on_created(event),
            FileSystemEvent::Deleted { .. } => self.on_deleted(event),
            FileSystemEvent::Modified { .. } => self.on_modified(event),
            FileSystemEvent::Moved { .. } => self.on_moved(event),
            FileSystemEvent::SelfDeleted { .. } => self.on_self_deleted(event),
        }
    }

    /// Called for every event, before the variant hook.
    fn on_any_event(&self, _event: &FileSystemEvent) {}

    /// Called when a file or directory is created.
    fn on_created(&self, _event: &FileSystemEvent) {}

    /// Called when a file or directory is deleted.
    fn on_deleted(&self, _event: &FileSystemEvent) {}

    /// Called when a file or directory is modified.
    fn on_modified(&self, _event: &FileSystemEvent) {}

    /// Called when a file or directory is moved or renamed.
    fn on_moved(&self, _event: &FileSystemEvent) {}

    /// Called when the watched root itself disappears.
    fn on_self_deleted(&self, _event: &FileSystemEvent) {}
}
