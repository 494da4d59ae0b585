//! Filesystem snapshots.

pub mod metadata;
pub mod walker;

pub use metadata::{Entry, EntryKind};
pub use walker::{LinkPolicy, Snapshot, WalkOptions};
