//! Blocking native change source backed by inotify.
//!
//! One [`DirectoryWatch`] owns one inotify instance per watched root. Reads
//! block until the kernel reports a batch of changes; a [`WatchCanceller`]
//! can wake a blocked read from another thread by removing the root watch,
//! which the kernel answers with an `IGNORED` record.
//!
//! inotify itself is not recursive: in recursive mode the source registers
//! one kernel watch per subdirectory at open time and adds watches for
//! directories that appear later, at event time. Reported names are
//! rebased so every [`RawEvent`] carries a path relative to the watch root.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use walkdir::WalkDir;

use super::error::WatchError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

const WATCH_MASK: WatchMask = WatchMask::CREATE
    .union(WatchMask::DELETE)
    .union(WatchMask::MODIFY)
    .union(WatchMask::ATTRIB)
    .union(WatchMask::MOVED_FROM)
    .union(WatchMask::MOVED_TO)
    .union(WatchMask::DELETE_SELF)
    .union(WatchMask::MOVE_SELF);

/// Raw change kind, one step above the kernel bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawAction {
    Created,
    Removed,
    Modified,
    RenamedOld,
    RenamedNew,
    /// The watched root itself is gone.
    RemovedSelf,
}

/// One decoded notification record; `path` is relative to the watch root
/// (empty for `RemovedSelf`).
#[derive(Debug, Clone)]
pub(crate) struct RawEvent {
    pub action: RawAction,
    pub path: PathBuf,
    /// Kernel-reported directory flag. For removals this is the only
    /// source of truth, since the entry no longer exists on disk.
    pub is_dir: bool,
}

/// Wakes a blocked [`DirectoryWatch::poll`] from another thread.
///
/// Removing the root kernel watch makes the pending read return an
/// `IGNORED` record, so cancellation never relies on a timeout. Safe to call
/// when the watch already failed or the root is already gone.
pub(crate) struct WatchCanceller {
    watches: Watches,
    root_wd: WatchDescriptor,
    cancelled: Arc<AtomicBool>,
}

impl WatchCanceller {
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Fails with EINVAL when the kernel already dropped the watch
        // (root deleted, or cancel called twice). Both are benign.
        let _ = self.watches.remove(self.root_wd.clone());
    }
}

/// Owns the native notification resources for one watched root.
#[derive(Debug)]
pub(crate) struct DirectoryWatch {
    inotify: Inotify,
    watches: Watches,
    root: PathBuf,
    canonical_root: PathBuf,
    recursive: bool,
    root_wd: WatchDescriptor,
    /// Kernel watch -> directory path relative to the root.
    wd_paths: HashMap<WatchDescriptor, PathBuf>,
    cancelled: Arc<AtomicBool>,
    buffer: Vec<u8>,
}

impl DirectoryWatch {
    /// Open the native source for `path`, registering kernel watches for
    /// the root and (in recursive mode) every current subdirectory.
    pub fn open(path: &Path, recursive: bool) -> Result<Self, WatchError> {
        let open_failed = |source: std::io::Error| WatchError::OpenFailed {
            path: path.to_path_buf(),
            source,
        };

        let canonical_root = fs::canonicalize(path).map_err(open_failed)?;
        let inotify = Inotify::init().map_err(open_failed)?;
        let mut watches = inotify.watches();
        let root_wd = watches.add(path, WATCH_MASK).map_err(open_failed)?;

        let mut wd_paths = HashMap::new();
        wd_paths.insert(root_wd.clone(), PathBuf::new());

        let mut source = Self {
            inotify,
            watches,
            root: path.to_path_buf(),
            canonical_root,
            recursive,
            root_wd,
            wd_paths,
            cancelled: Arc::new(AtomicBool::new(false)),
            buffer: vec![0u8; READ_BUFFER_SIZE],
        };

        if recursive {
            source.register_tree(&PathBuf::new());
        }
        Ok(source)
    }

    /// Handle for cancelling a blocked poll from another thread.
    pub fn canceller(&self) -> WatchCanceller {
        WatchCanceller {
            watches: self.watches.clone(),
            root_wd: self.root_wd.clone(),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Block until the kernel reports changes, then decode them.
    ///
    /// A cancelled read returns an empty batch. A read failure while the
    /// root no longer resolves to its canonical path becomes a single
    /// `RemovedSelf` record; any other failure is `WatchError::Native`.
    pub fn poll(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        let raw: Vec<(WatchDescriptor, EventMask, Option<std::ffi::OsString>)> =
            match self.inotify.read_events_blocking(&mut self.buffer) {
                Ok(events) => events
                    .map(|e| (e.wd.clone(), e.mask, e.name.map(|n| n.to_os_string())))
                    .collect(),
                Err(source) => {
                    if self.cancelled.load(Ordering::SeqCst) {
                        return Ok(Vec::new());
                    }
                    if self.root_is_gone() {
                        return Ok(vec![RawEvent {
                            action: RawAction::RemovedSelf,
                            path: PathBuf::new(),
                            is_dir: true,
                        }]);
                    }
                    return Err(WatchError::Native { source });
                }
            };

        let mut batch = Vec::with_capacity(raw.len());
        for (wd, mask, name) in raw {
            if mask.contains(EventMask::Q_OVERFLOW) {
                tracing::warn!(
                    "[native] event queue overflow on {}; some changes were lost",
                    self.root.display()
                );
                continue;
            }
            if mask.contains(EventMask::IGNORED) {
                self.wd_paths.remove(&wd);
                continue;
            }
            if mask.intersects(EventMask::DELETE_SELF | EventMask::MOVE_SELF) {
                if wd == self.root_wd {
                    batch.push(RawEvent {
                        action: RawAction::RemovedSelf,
                        path: PathBuf::new(),
                        is_dir: true,
                    });
                } else {
                    self.wd_paths.remove(&wd);
                }
                continue;
            }

            let Some(dir_rel) = self.wd_paths.get(&wd).cloned() else {
                continue;
            };
            let Some(name) = name else { continue };
            let rel = dir_rel.join(name);
            let is_dir = mask.contains(EventMask::ISDIR);

            let action = if mask.contains(EventMask::CREATE) {
                if is_dir && self.recursive {
                    self.register_tree(&rel);
                }
                RawAction::Created
            } else if mask.contains(EventMask::MOVED_TO) {
                if is_dir && self.recursive {
                    self.register_tree(&rel);
                }
                RawAction::RenamedNew
            } else if mask.contains(EventMask::MOVED_FROM) {
                if is_dir && self.recursive {
                    self.unregister_tree(&rel);
                }
                RawAction::RenamedOld
            } else if mask.contains(EventMask::DELETE) {
                RawAction::Removed
            } else if mask.intersects(EventMask::MODIFY | EventMask::ATTRIB) {
                RawAction::Modified
            } else {
                continue;
            };

            batch.push(RawEvent {
                action,
                path: rel,
                is_dir,
            });
        }
        Ok(batch)
    }

    /// True when the watched path no longer resolves to the directory the
    /// handle was opened on (deleted, or moved out from under the watch).
    fn root_is_gone(&self) -> bool {
        match fs::canonicalize(&self.root) {
            Ok(current) => current != self.canonical_root,
            Err(_) => true,
        }
    }

    /// Register kernel watches for `rel` and every directory below it.
    ///
    /// Failures are tolerated: the directory may be gone again by the time
    /// we get here, and a partially-registered subtree is still recovered by
    /// the emitter's synthetic tree walks.
    fn register_tree(&mut self, rel: &Path) {
        let abs = self.root.join(rel);
        let walker = WalkDir::new(&abs).into_iter().filter_map(|e| e.ok());
        for entry in walker.filter(|e| e.file_type().is_dir()) {
            let Ok(entry_rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let entry_rel = entry_rel.to_path_buf();
            match self.watches.add(entry.path(), WATCH_MASK) {
                Ok(wd) => {
                    self.wd_paths.insert(wd, entry_rel);
                }
                Err(e) => {
                    tracing::debug!(
                        "[native] could not watch subdirectory {}: {e}",
                        entry.path().display()
                    );
                }
            }
        }
    }

    /// Drop kernel watches for `rel` and everything below it. The watched
    /// inodes moved away, so their descriptors would otherwise keep
    /// reporting stale paths.
    fn unregister_tree(&mut self, rel: &Path) {
        let stale: Vec<WatchDescriptor> = self
            .wd_paths
            .iter()
            .filter(|(_, dir)| dir.as_path() == rel || dir.starts_with(rel))
            .map(|(wd, _)| wd.clone())
            .collect();
        for wd in stale {
            self.wd_paths.remove(&wd);
            let _ = self.watches.remove(wd);
        }
    }
}
