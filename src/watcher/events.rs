//! Typed filesystem events and subtree event synthesis.
//!
//! Events are a closed tagged union with structural equality, so the dedup
//! queue can compare them and handlers can match on exactly one entry point.
//! Synthetic events are those inferred by walking a subtree after a create
//! or move, rather than reported directly by the kernel.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A typed filesystem change observed under a watched path.
///
/// Equality and hashing are structural over the variant and every field;
/// two identical reports from the native layer compare equal, which is what
/// the deduplicating queue relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileSystemEvent {
    /// A file or directory appeared.
    Created {
        path: PathBuf,
        is_directory: bool,
        is_synthetic: bool,
    },
    /// A file or directory was removed.
    Deleted {
        path: PathBuf,
        is_directory: bool,
        is_synthetic: bool,
    },
    /// Contents or metadata changed.
    Modified {
        path: PathBuf,
        is_directory: bool,
        is_synthetic: bool,
    },
    /// A rename within the watched tree.
    Moved {
        src_path: PathBuf,
        dest_path: PathBuf,
        is_directory: bool,
        is_synthetic: bool,
    },
    /// The watched root itself was deleted or moved away. The emitter stops
    /// after delivering this.
    SelfDeleted { path: PathBuf },
}

impl FileSystemEvent {
    /// The path the event is about; for moves, the destination.
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path, .. }
            | Self::Deleted { path, .. }
            | Self::Modified { path, .. }
            | Self::SelfDeleted { path } => path,
            Self::Moved { dest_path, .. } => dest_path,
        }
    }

    /// Whether the event refers to a directory.
    pub fn is_directory(&self) -> bool {
        match self {
            Self::Created { is_directory, .. }
            | Self::Deleted { is_directory, .. }
            | Self::Modified { is_directory, .. }
            | Self::Moved { is_directory, .. } => *is_directory,
            Self::SelfDeleted { .. } => true,
        }
    }

    /// Whether the event was inferred by a tree walk instead of reported by
    /// the kernel.
    pub fn is_synthetic(&self) -> bool {
        match self {
            Self::Created { is_synthetic, .. }
            | Self::Deleted { is_synthetic, .. }
            | Self::Modified { is_synthetic, .. }
            | Self::Moved { is_synthetic, .. } => *is_synthetic,
            Self::SelfDeleted { .. } => false,
        }
    }
}

/// Synthesize one `Created` event per entry discovered under `root`.
///
/// When a whole subtree appears atomically (e.g. moved in from outside the
/// watched tree), the kernel only reports the top-level directory. Walking
/// it afterwards recovers the children.
pub fn synthesize_created_events(root: &Path) -> Vec<FileSystemEvent> {
    let mut events = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("[events] subtree walk failed under {}: {e}", root.display());
                continue;
            }
        };
        events.push(FileSystemEvent::Created {
            path: entry.path().to_path_buf(),
            is_directory: entry.file_type().is_dir(),
            is_synthetic: true,
        });
    }
    events
}

/// Synthesize one `Moved` event per entry discovered under `dest_root`.
///
/// The source path of each child is computed by replacing the destination
/// prefix with the source prefix, mirroring where the entry lived before the
/// directory itself was moved.
pub fn synthesize_moved_events(src_root: &Path, dest_root: &Path) -> Vec<FileSystemEvent> {
    let mut events = Vec::new();
    for entry in WalkDir::new(dest_root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    "[events] subtree walk failed under {}: {e}",
                    dest_root.display()
                );
                continue;
            }
        };
        let dest_path = entry.path().to_path_buf();
        let src_path = match dest_path.strip_prefix(dest_root) {
            Ok(rel) => src_root.join(rel),
            Err(_) => continue,
        };
        events.push(FileSystemEvent::Moved {
            src_path,
            dest_path,
            is_directory: entry.file_type().is_dir(),
            is_synthetic: true,
        });
    }
    events
}
