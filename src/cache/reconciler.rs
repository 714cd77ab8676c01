//! Event handler that keeps a [`FileCache`] consistent with the disk.
//!
//! One reconciler is registered on every watch feeding a cache. Hooks run on
//! the dispatcher thread, so each does a bounded amount of work: point
//! queries, one insert/delete/replace, or a prefix purge.

use std::path::Path;
use std::sync::Arc;

use crate::watcher::{EventHandler, FileSystemEvent};

use super::record::MsdRecord;
use super::store::{FileCache, PathQuery, prefix_pattern};

/// Applies filesystem events to the shared cache.
pub struct CacheReconciler {
    cache: Arc<FileCache>,
}

impl CacheReconciler {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    /// Insert `path` unless an equal record is already cached. Created and
    /// moved-in files can be reported twice (kernel event plus subtree
    /// synthesis), so insertion is guarded by a point query.
    fn insert_if_absent(&self, path: &Path) {
        let Ok(record) = MsdRecord::from_path(path) else {
            crate::debug_event!("reconciler", "ignored", "{}", path.display());
            return;
        };
        match self.cache.query_by_path(PathQuery::Exact(path)) {
            Ok(existing) if existing.is_empty() => {
                crate::log_event!("reconciler", "cached", "{}", path.display());
                self.cache.insert(record);
            }
            Ok(_) => {
                crate::debug_event!("reconciler", "duplicate", "{}", path.display());
            }
            Err(e) => {
                tracing::warn!("[reconciler] create lookup failed for {}: {e}", path.display());
            }
        }
    }

    /// Drop every record whose path starts with `path`. Directory deletions
    /// and root disappearance do not enumerate children, so the purge walks
    /// the cache instead of the (gone) disk tree.
    fn purge_prefix(&self, path: &Path) {
        let pattern = match prefix_pattern(path) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!("[reconciler] purge pattern failed for {}: {e}", path.display());
                return;
            }
        };
        match self.cache.query_by_path(PathQuery::Pattern(&pattern)) {
            Ok(stale) => {
                for record in &stale {
                    self.cache.delete(record);
                }
                if !stale.is_empty() {
                    crate::log_event!(
                        "reconciler",
                        "purged",
                        "{} records under {}",
                        stale.len(),
                        path.display()
                    );
                }
            }
            Err(e) => {
                tracing::warn!("[reconciler] purge lookup failed for {}: {e}", path.display());
            }
        }
    }
}

impl EventHandler for CacheReconciler {
    fn on_created(&self, event: &FileSystemEvent) {
        // Directory creations carry no records themselves; their children
        // arrive as separate (possibly synthetic) file events.
        if !event.is_directory() {
            self.insert_if_absent(event.path());
        }
    }

    fn on_deleted(&self, event: &FileSystemEvent) {
        if event.is_directory() {
            self.purge_prefix(event.path());
            return;
        }
        if let Ok(record) = MsdRecord::from_path(event.path()) {
            if self.cache.delete(&record) {
                crate::log_event!("reconciler", "evicted", "{}", event.path().display());
            }
        }
    }

    fn on_moved(&self, event: &FileSystemEvent) {
        let FileSystemEvent::Moved {
            src_path,
            dest_path,
            is_directory,
            ..
        } = event
        else {
            return;
        };
        if *is_directory {
            // Children are reconciled by their own synthetic move events,
            // which the emitter delivers before the directory's.
            return;
        }

        let cached = match self.cache.query_by_path(PathQuery::Exact(src_path)) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(
                    "[reconciler] move lookup failed for {}: {e}",
                    src_path.display()
                );
                return;
            }
        };

        match MsdRecord::from_path(dest_path) {
            Ok(renamed) => {
                if cached.is_empty() {
                    // Moved in from an uncached name; treat as a create.
                    self.insert_if_absent(dest_path);
                    return;
                }
                for old in &cached {
                    self.cache.replace(old, renamed.clone());
                }
                crate::log_event!(
                    "reconciler",
                    "renamed",
                    "{} -> {}",
                    src_path.display(),
                    dest_path.display()
                );
            }
            Err(_) => {
                // Renamed out of the naming convention; drop the stale entry.
                for old in &cached {
                    self.cache.delete(old);
                }
            }
        }
    }

    fn on_self_deleted(&self, event: &FileSystemEvent) {
        tracing::warn!("[reconciler] watched root gone: {}", event.path().display());
        self.purge_prefix(event.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn reconciler() -> (CacheReconciler, Arc<FileCache>) {
        let cache = Arc::new(FileCache::new());
        (CacheReconciler::new(Arc::clone(&cache)), cache)
    }

    fn created(path: &str) -> FileSystemEvent {
        FileSystemEvent::Created {
            path: PathBuf::from(path),
            is_directory: false,
            is_synthetic: false,
        }
    }

    #[test]
    fn test_duplicate_create_cached_once() {
        let (reconciler, cache) = reconciler();
        let event = created("/data/TRG_103502_20230427_020000.msd");

        reconciler.dispatch(&event);
        reconciler.dispatch(&event);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unrecognized_create_ignored() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&created("/data/readme.txt"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_directory_delete_purges_by_prefix() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&created("/data/station/TRG_103502_20230427_020000.msd"));
        reconciler.dispatch(&created("/data/station/TRG_103502_20230427_020005.msd"));
        reconciler.dispatch(&created("/data/other/TRG_103503_20230427_020000.msd"));

        reconciler.dispatch(&FileSystemEvent::Deleted {
            path: PathBuf::from("/data/station"),
            is_directory: true,
            is_synthetic: false,
        });

        let remaining = cache.records();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            remaining[0].path(),
            Path::new("/data/other/TRG_103503_20230427_020000.msd")
        );
    }

    #[test]
    fn test_file_move_replaces_in_place() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&created("/data/TRG_103502_20230427_020000.msd"));
        reconciler.dispatch(&created("/data/TRG_103502_20230427_020005.msd"));

        reconciler.dispatch(&FileSystemEvent::Moved {
            src_path: PathBuf::from("/data/TRG_103502_20230427_020000.msd"),
            dest_path: PathBuf::from("/data/TRG_103502_20230427_020000+0000.msd"),
            is_directory: false,
            is_synthetic: false,
        });

        let records = cache.records();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].path(),
            Path::new("/data/TRG_103502_20230427_020000+0000.msd")
        );
    }

    #[test]
    fn test_move_to_unrecognized_name_evicts() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&created("/data/TRG_103502_20230427_020000.msd"));

        reconciler.dispatch(&FileSystemEvent::Moved {
            src_path: PathBuf::from("/data/TRG_103502_20230427_020000.msd"),
            dest_path: PathBuf::from("/data/TRG_103502_20230427_020000.bak"),
            is_directory: false,
            is_synthetic: false,
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_move_in_of_uncached_file_inserts() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&FileSystemEvent::Moved {
            src_path: PathBuf::from("/outside/TRG_103502_20230427_020000.msd"),
            dest_path: PathBuf::from("/data/TRG_103502_20230427_020000.msd"),
            is_directory: false,
            is_synthetic: false,
        });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_self_delete_purges_root() {
        let (reconciler, cache) = reconciler();
        reconciler.dispatch(&created("/data/TRG_103502_20230427_020000.msd"));

        reconciler.dispatch(&FileSystemEvent::SelfDeleted {
            path: PathBuf::from("/data"),
        });
        assert!(cache.is_empty());
    }
}
