//! Error types for the watcher pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watch setup, native polling, and registry operations.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The watched directory could not be opened. Fatal to that watch and
    /// surfaced to the caller of `schedule`.
    #[error("cannot open watch on {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The native notification read failed for a reason other than a benign
    /// cancel. Fatal to the owning emitter; not retried automatically.
    #[error("native notification read failed: {source}")]
    Native {
        #[source]
        source: std::io::Error,
    },

    /// An emitter or dispatcher thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `unschedule` was called for a watch that is not registered.
    #[error("watch is not scheduled: {path} (recursive: {recursive})")]
    NotScheduled { path: PathBuf, recursive: bool },
}
