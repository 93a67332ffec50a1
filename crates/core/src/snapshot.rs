//! Snapshot store and diff engine
//!
//! Holds the last-observed modification time for every path under a
//! registered root and classifies fresh scans into created/modified/deleted
//! deltas against that baseline.

use crate::scan::TreeSnapshot;
use std::path::{Path, PathBuf};

/// Baseline mapping of path -> last observed mtime for one registered root
///
/// Owned exclusively by the registration's dispatcher; all mutation goes
/// through [`SnapshotStore::apply_scan`], after the corresponding delta has
/// been produced.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: TreeSnapshot,
}

/// Changes classified by one dispatch cycle
///
/// The three lists form an unordered partition of the change set for the
/// batch; no ordering is guaranteed within or across them.
#[derive(Debug, Default)]
pub struct TreeDelta {
    pub created: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl TreeDelta {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

impl SnapshotStore {
    /// Seed the store from an initial registration-time scan
    pub fn new(initial: TreeSnapshot) -> Self {
        Self { entries: initial }
    }

    /// Number of paths currently tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Diff a fresh scan of `subtree` against the baseline and update it
    ///
    /// Classification:
    /// - created: scanned paths unknown to the store
    /// - modified: known paths whose mtime differs (strict inequality; an
    ///   equal mtime is never reported, even if content changed underneath)
    /// - deleted: stored paths under `subtree` that the scan no longer saw
    ///
    /// The store is updated unconditionally, whether or not the caller's
    /// subscription mask will suppress any of the resulting events, so the
    /// baseline never drifts from disk truth.
    pub fn apply_scan(&mut self, subtree: &Path, fresh: TreeSnapshot) -> TreeDelta {
        let mut delta = TreeDelta::default();

        for (path, mtime) in &fresh {
            match self.entries.get(path) {
                None => delta.created.push(path.clone()),
                Some(known) if known != mtime => delta.modified.push(path.clone()),
                Some(_) => {}
            }
        }

        // Deletions are scoped to the notified subtree: paths elsewhere
        // under the root were not rescanned and must keep their entries.
        for path in self.entries.keys() {
            if path.starts_with(subtree) && !fresh.contains_key(path) {
                delta.deleted.push(path.clone());
            }
        }

        for path in &delta.deleted {
            self.entries.remove(path);
        }
        for (path, mtime) in fresh {
            self.entries.insert(path, mtime);
        }

        delta
    }
}
