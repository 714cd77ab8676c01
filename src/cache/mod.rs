//! Time-ordered cache of MSD data files and its event-driven reconciler.

mod error;
mod reconciler;
mod record;
mod store;

pub use error::CacheError;
pub use reconciler::CacheReconciler;
pub use record::MsdRecord;
pub use store::{FileCache, PathQuery, prefix_pattern};
