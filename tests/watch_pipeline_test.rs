//! End-to-end pipeline tests: real directories, real file operations, and
//! the full emitter/queue/dispatcher/reconciler stack.
//!
//! Timing: inotify delivery is fast but not synchronous, so assertions poll
//! the cache with a generous deadline instead of sleeping a fixed amount.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use msdwatch::config::{Settings, WatchPathConfig};
use msdwatch::{PathQuery, WatchService};
use tempfile::TempDir;

fn service_on(root: &Path) -> WatchService {
    let mut settings = Settings::default();
    settings.watcher.settle_delay_ms = 50;
    settings.watcher.paths.push(WatchPathConfig {
        path: root.to_path_buf(),
        recursive: true,
    });
    let mut service = WatchService::new(&settings).unwrap();
    service.start().unwrap();
    service
}

fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for: {what}");
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn test_created_file_lands_in_cache() {
    let temp = TempDir::new().unwrap();
    let mut service = service_on(temp.path());

    let file = temp.path().join("TRG_103502_20230427_020000.msd");
    fs::write(&file, b"waveform").unwrap();

    wait_until("create reconciled", || service.cache().len() == 1);
    let cached = service
        .cache()
        .query_by_path(PathQuery::Exact(&file))
        .unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].section(), "103502");

    service.shutdown();
}

#[test]
fn test_unrecognized_files_never_cached() {
    let temp = TempDir::new().unwrap();
    let mut service = service_on(temp.path());

    fs::write(temp.path().join("notes.txt"), b"x").unwrap();
    fs::write(temp.path().join("TRG_103502_20230427_020000.msd"), b"x").unwrap();

    wait_until("msd file reconciled", || service.cache().len() == 1);
    // The txt file produced events too; give them time to drain, then
    // confirm nothing else was cached.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(service.cache().len(), 1);

    service.shutdown();
}

#[test]
fn test_file_in_new_subdirectory_is_picked_up() {
    let temp = TempDir::new().unwrap();
    let mut service = service_on(temp.path());

    let nested = temp.path().join("station").join("day1");
    fs::create_dir_all(&nested).unwrap();
    // Wait out the settle delay plus watch registration for the new dirs.
    thread::sleep(Duration::from_millis(300));
    fs::write(nested.join("TRG_103502_20230427_020000.msd"), b"x").unwrap();

    wait_until("nested create reconciled", || service.cache().len() == 1);
    service.shutdown();
}

#[test]
fn test_moved_in_directory_contents_are_cached() {
    let temp = TempDir::new().unwrap();
    let watched = temp.path().join("watched");
    let outside = temp.path().join("outside");
    fs::create_dir(&watched).unwrap();
    fs::create_dir_all(outside.join("batch")).unwrap();
    fs::write(outside.join("batch/TRG_103502_20230427_020000.msd"), b"x").unwrap();
    fs::write(outside.join("batch/TRG_103502_20230427_020005.msd"), b"x").unwrap();

    let mut service = service_on(&watched);
    fs::rename(outside.join("batch"), watched.join("batch")).unwrap();

    wait_until("moved-in files reconciled", || service.cache().len() == 2);
    service.shutdown();
}

#[test]
fn test_rename_within_tree_replaces_record() {
    let temp = TempDir::new().unwrap();
    let old = temp.path().join("TRG_103502_20230427_020000.msd");
    fs::write(&old, b"x").unwrap();

    let mut service = service_on(temp.path());
    assert_eq!(service.cache().len(), 1);

    let new = temp.path().join("TRG_103502_20230427_020000+0000.msd");
    fs::rename(&old, &new).unwrap();

    wait_until("rename reconciled", || {
        service
            .cache()
            .query_by_path(PathQuery::Exact(&new))
            .unwrap()
            .len()
            == 1
    });
    assert_eq!(service.cache().len(), 1);

    service.shutdown();
}

#[test]
fn test_deleted_directory_purges_cached_records() {
    let temp = TempDir::new().unwrap();
    let station = temp.path().join("station");
    fs::create_dir(&station).unwrap();
    fs::write(station.join("TRG_103502_20230427_020000.msd"), b"x").unwrap();
    fs::write(temp.path().join("TRG_103503_20230427_020000.msd"), b"x").unwrap();

    let mut service = service_on(temp.path());
    assert_eq!(service.cache().len(), 2);

    fs::remove_dir_all(&station).unwrap();

    wait_until("directory delete reconciled", || service.cache().len() == 1);
    let remaining = service.cache().records();
    assert_eq!(
        remaining[0].path(),
        temp.path().join("TRG_103503_20230427_020000.msd")
    );

    service.shutdown();
}

#[test]
fn test_shutdown_stops_emitters_and_clears_cache() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("TRG_103502_20230427_020000.msd"), b"x").unwrap();

    let mut service = service_on(temp.path());
    assert_eq!(service.cache().len(), 1);
    let watch = service.watches()[0].clone();

    service.shutdown();
    assert!(service.cache().is_empty());
    assert!(!service.observer().emitter_alive(&watch));
}
