//! Per-watch emitter thread: native records in, typed events out.
//!
//! Each emitter loops over the blocking native poll and translates raw
//! records into [`FileSystemEvent`]s. Rename pairs combine into moves,
//! directory creates and moves trigger a settle delay followed by a
//! synthetic tree walk, and a self-deleted root ends the emitter.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::WatchError;
use super::events::{FileSystemEvent, synthesize_created_events, synthesize_moved_events};
use super::native::{DirectoryWatch, RawAction, RawEvent, WatchCanceller};
use super::observer::WatchedPath;
use super::queue::EventQueue;

/// Control handle for a running emitter thread.
pub(crate) struct EmitterHandle {
    running: Arc<AtomicBool>,
    canceller: WatchCanceller,
    thread: Option<JoinHandle<()>>,
}

impl EmitterHandle {
    /// Stop the emitter: clear the run flag, cancel the in-flight native
    /// poll, then join. The native handle closes when the thread exits and
    /// drops the source, so it is never closed under a live poll.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.canceller.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Whether the emitter thread is still running. A fatal native error
    /// stops the emitter without unscheduling the watch, so owners that
    /// need re-registration can probe this.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Open the native source for `watch` and start its emitter thread.
pub(crate) fn spawn_emitter(
    queue: Arc<EventQueue>,
    watch: WatchedPath,
    settle_delay: Duration,
) -> Result<EmitterHandle, WatchError> {
    let source = DirectoryWatch::open(watch.path(), watch.is_recursive())?;
    let canceller = source.canceller();
    let running = Arc::new(AtomicBool::new(true));

    let thread_running = Arc::clone(&running);
    let thread = thread::Builder::new()
        .name(format!("emitter:{}", watch.path().display()))
        .spawn(move || run(source, queue, watch, settle_delay, thread_running))
        .map_err(|source| WatchError::Spawn {
            name: "emitter",
            source,
        })?;

    Ok(EmitterHandle {
        running,
        canceller,
        thread: Some(thread),
    })
}

fn run(
    mut source: DirectoryWatch,
    queue: Arc<EventQueue>,
    watch: WatchedPath,
    settle_delay: Duration,
    running: Arc<AtomicBool>,
) {
    crate::debug_event!("emitter", "started", "{}", watch.path().display());

    while running.load(Ordering::SeqCst) {
        let batch = match source.poll() {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(
                    "[emitter] native poll failed for {}: {e}",
                    watch.path().display()
                );
                break;
            }
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if !queue_batch(&queue, &watch, settle_delay, batch) {
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
    crate::debug_event!("emitter", "stopped", "{}", watch.path().display());
}

/// Translate one raw batch into typed events on the queue. Returns false
/// when the emitter must stop (self-deleted root).
fn queue_batch(
    queue: &EventQueue,
    watch: &WatchedPath,
    settle_delay: Duration,
    batch: Vec<RawEvent>,
) -> bool {
    // Source half of a rename, waiting for its destination half.
    let mut pending_rename: Option<(PathBuf, bool)> = None;

    for raw in batch {
        let path = watch.path().join(&raw.path);
        match raw.action {
            RawAction::RenamedOld => {
                if let Some((stale, stale_is_dir)) = pending_rename.take() {
                    queue_move_out(queue, watch, stale, stale_is_dir);
                }
                pending_rename = Some((path, raw.is_dir));
            }
            RawAction::RenamedNew => match pending_rename.take() {
                Some((src_path, _)) => {
                    let dest_path = path;
                    if dest_path.is_dir() {
                        if watch.is_recursive() {
                            // Let in-flight writes inside the moved tree
                            // finish before enumerating it.
                            thread::sleep(settle_delay);
                            for event in synthesize_moved_events(&src_path, &dest_path) {
                                queue.put(event, watch.clone());
                            }
                        }
                        queue.put(
                            FileSystemEvent::Moved {
                                src_path,
                                dest_path,
                                is_directory: true,
                                is_synthetic: false,
                            },
                            watch.clone(),
                        );
                    } else {
                        queue.put(
                            FileSystemEvent::Moved {
                                src_path,
                                dest_path,
                                is_directory: false,
                                is_synthetic: false,
                            },
                            watch.clone(),
                        );
                    }
                }
                // Destination half with no source half: moved in from
                // outside the watched tree, observed as a create.
                None => queue_created(queue, watch, settle_delay, path),
            },
            RawAction::Created => queue_created(queue, watch, settle_delay, path),
            RawAction::Modified => {
                queue.put(
                    FileSystemEvent::Modified {
                        is_directory: path.is_dir(),
                        path,
                        is_synthetic: false,
                    },
                    watch.clone(),
                );
            }
            RawAction::Removed => {
                queue.put(
                    FileSystemEvent::Deleted {
                        path,
                        is_directory: raw.is_dir,
                        is_synthetic: false,
                    },
                    watch.clone(),
                );
            }
            RawAction::RemovedSelf => {
                queue.put(
                    FileSystemEvent::SelfDeleted {
                        path: watch.path().to_path_buf(),
                    },
                    watch.clone(),
                );
                return false;
            }
        }
    }

    // Source half never matched within the batch: the entry moved outside
    // the watched tree.
    if let Some((stale, stale_is_dir)) = pending_rename.take() {
        queue_move_out(queue, watch, stale, stale_is_dir);
    }
    true
}

fn queue_created(queue: &EventQueue, watch: &WatchedPath, settle_delay: Duration, path: PathBuf) {
    let is_directory = path.is_dir();
    queue.put(
        FileSystemEvent::Created {
            path: path.clone(),
            is_directory,
            is_synthetic: false,
        },
        watch.clone(),
    );
    if is_directory && watch.is_recursive() {
        // A subtree that appears atomically is reported as one record; the
        // children only surface through this walk.
        thread::sleep(settle_delay);
        for event in synthesize_created_events(&path) {
            queue.put(event, watch.clone());
        }
    }
}

fn queue_move_out(queue: &EventQueue, watch: &WatchedPath, path: PathBuf, is_directory: bool) {
    queue.put(
        FileSystemEvent::Deleted {
            path,
            is_directory,
            is_synthetic: true,
        },
        watch.clone(),
    );
}
