//! Directory watching and time-ordered caching for MSD seismic data files.
//!
//! This crate pairs a native inotify-based watcher with an in-memory,
//! time-ordered cache of recognized data files. Raw kernel notifications are
//! decoded into typed [`FileSystemEvent`]s by one emitter thread per watched
//! path, deduplicated, and fanned out by a single dispatcher to registered
//! handlers. The built-in [`CacheReconciler`] handler keeps the
//! [`FileCache`] consistent with the filesystem, including the notification
//! quirks the native facility has: duplicate create reports, directory
//! deletions that do not enumerate children, and moved subtrees that need
//! synthetic per-child events.
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatch (blocking inotify reads, one per watch)
//!       |
//!   EventEmitter (decode, pair renames, synthesize subtree events)
//!       |
//!   EventQueue (FIFO, collapses the repeated pending tail)
//!       |
//!   Observer (single consumer, routes to handlers per watch)
//!       |
//!   CacheReconciler ---> FileCache <--- external queries
//! ```
//!
//! [`WatchService`] is the composition root that wires all of the above from
//! a [`Settings`] value.

pub mod cache;
pub mod config;
pub mod logging;
pub mod service;
pub mod watcher;

pub use cache::{CacheError, CacheReconciler, FileCache, MsdRecord, PathQuery};
pub use config::Settings;
pub use service::WatchService;
pub use watcher::{
    EventHandler, EventQueue, FileSystemEvent, Observer, WatchError, WatchedPath,
};
