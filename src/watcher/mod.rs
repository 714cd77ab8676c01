//! Native directory watching: change source, emitters, dedup queue, and the
//! dispatching observer.
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatch (one blocking inotify source per watch)
//!        |
//!  EventEmitter (one thread per watch)
//!        |
//!   EventQueue (shared FIFO, drops the repeated pending tail)
//!        |
//!    Observer (single consumer, handler fan-out per watch)
//! ```

mod emitter;
mod error;
mod events;
mod handler;
mod native;
mod observer;
mod queue;

pub use error::WatchError;
pub use events::{FileSystemEvent, synthesize_created_events, synthesize_moved_events};
pub use handler::EventHandler;
pub use observer::{HandlerRef, Observer, WatchedPath};
pub use queue::{EventQueue, QueueEntry};
