//! Composition root wiring configuration, cache, and observer together.

use std::sync::Arc;

use crate::cache::{CacheReconciler, FileCache};
use crate::config::Settings;
use crate::watcher::{HandlerRef, Observer, WatchError, WatchedPath};

/// Owns the cache and the observer for the configured watch roots.
///
/// Startup order matters: the cache is bulk-loaded from disk first, then
/// emitters start, then the dispatcher. Files that land between the bulk
/// load and emitter start are missed; files that land between emitter start
/// and dispatcher start queue up and are reconciled once dispatch begins,
/// with the duplicate-create guard absorbing any overlap.
pub struct WatchService {
    cache: Arc<FileCache>,
    observer: Observer,
    watches: Vec<WatchedPath>,
}

impl WatchService {
    /// Build the service: load the cache from every configured root and
    /// schedule a reconciler on each. Emitters are live after this returns;
    /// call [`start`](Self::start) to begin dispatching.
    pub fn new(settings: &Settings) -> Result<Self, WatchError> {
        let cache = Arc::new(FileCache::new());
        let observer = Observer::new(settings.watcher.settle_delay());
        let reconciler: HandlerRef = Arc::new(CacheReconciler::new(Arc::clone(&cache)));

        let mut watches = Vec::with_capacity(settings.watcher.paths.len());
        for entry in &settings.watcher.paths {
            cache.init_cache(&entry.path);
            let watch = observer.schedule(Arc::clone(&reconciler), &entry.path, entry.recursive)?;
            watches.push(watch);
        }

        Ok(Self {
            cache,
            observer,
            watches,
        })
    }

    /// Start dispatching queued events to the reconciler.
    pub fn start(&mut self) -> Result<(), WatchError> {
        self.observer.start()
    }

    /// Stop dispatch and all emitters, then drop every cached record.
    pub fn shutdown(&mut self) {
        self.observer.stop();
        self.cache.clear_cache();
        crate::log_event!("service", "shut down");
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn watches(&self) -> &[WatchedPath] {
        &self.watches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchPathConfig;
    use std::fs;
    use tempfile::TempDir;

    fn settings_for(path: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.watcher.settle_delay_ms = 0;
        settings.watcher.paths.push(WatchPathConfig {
            path: path.to_path_buf(),
            recursive: true,
        });
        settings
    }

    #[test]
    fn test_new_loads_existing_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("TRG_103502_20230427_020000.msd"), b"x").unwrap();
        fs::write(temp.path().join("notes.txt"), b"x").unwrap();

        let mut service = WatchService::new(&settings_for(temp.path())).unwrap();
        assert_eq!(service.cache().len(), 1);
        assert_eq!(service.watches().len(), 1);
        assert!(service.observer().emitter_alive(&service.watches()[0]));

        service.shutdown();
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_new_fails_on_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let result = WatchService::new(&settings_for(&missing));
        assert!(matches!(result, Err(WatchError::OpenFailed { .. })));
    }
}
