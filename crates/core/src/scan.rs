//! Recursive directory scanner
//!
//! Produces the full set of paths reachable under a root, filtered by an
//! optional directory-inclusion predicate. One scan runs at registration
//! time to seed the diff baseline and one per change signal afterwards, so
//! this is the dominant cost center; callers watching large trees should
//! scope the predicate tightly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Caller-supplied predicate over absolute paths
pub type PathPredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Result of one recursive scan: path -> last modification time
///
/// Contains directories as well as files, including the root itself.
pub type TreeSnapshot = HashMap<PathBuf, SystemTime>;

/// Recursively list `root`, returning every reachable path with its mtime
///
/// Directories (the root included) are listed and descended into only when
/// `include` accepts them; files are included whenever their parent
/// directory was. Entries that vanish or become unreadable mid-scan are
/// omitted silently: a listing race is not an error, and the next dispatch
/// cycle reconciles whatever was missed.
pub fn scan_tree(root: &Path, include: Option<&PathPredicate>) -> TreeSnapshot {
    let mut snapshot = TreeSnapshot::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                include.map_or(true, |accept| accept(entry.path()))
            } else {
                true
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let mtime = match meta.modified() {
            Ok(mtime) => mtime,
            Err(_) => continue,
        };
        snapshot.insert(entry.into_path(), mtime);
    }

    snapshot
}
