//! Run history persistence: per-run directories with workspace snapshots and
//! a JSON manifest, plus listing, restore, and transcript replay.

pub mod error;
pub mod history;

pub use error::StoreError;
pub use history::{clear_dir, copy_dir_recursive, HistoryStore, MANIFEST_FILE};
