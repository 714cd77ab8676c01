//! Error types for the record cache.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from record validation and cache queries.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The filename does not follow the MSD naming convention. Callers
    /// discovering files treat this as "not ours" and skip the file.
    #[error("filename does not match the MSD naming convention: {path}")]
    UnrecognizedFilename { path: PathBuf },

    /// A query was called with an argument that violates its contract.
    #[error("invalid {argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
}
