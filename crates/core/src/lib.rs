//! Core types for the Vigil directory-change notification service
//!
//! This crate provides:
//! - Event model and subscription masks
//! - Recursive directory scanner with inclusion predicates
//! - Snapshot store + diff engine (create/modify/delete classification)
//!
//! Everything here is synchronous and free of threads; the runtime pieces
//! (watch keys, dispatch, the service facade) live in `vigil-watcher`.

pub mod error;
pub mod event;
pub mod scan;
pub mod snapshot;

// Re-exports
pub use error::Error;
pub use event::{Event, EventKind, EventKinds};
pub use scan::{scan_tree, PathPredicate, TreeSnapshot};
pub use snapshot::{SnapshotStore, TreeDelta};

/// Result type for watch operations
pub type Result<T> = std::result::Result<T, Error>;
