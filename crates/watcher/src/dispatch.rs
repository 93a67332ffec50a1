//! Per-root change dispatch: scan, diff, enqueue

use crate::key::WatchKey;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use vigil_core::scan::{scan_tree, PathPredicate};
use vigil_core::snapshot::SnapshotStore;
use vigil_core::EventKind;

/// Optional per-registration dispatch behavior
#[derive(Default)]
pub struct DispatchOptions {
    /// Directory-inclusion predicate applied while scanning
    pub include: Option<PathPredicate>,
    /// Change-relevance predicate; rejected signals are dropped before any
    /// scan or store mutation happens
    pub relevance: Option<PathPredicate>,
    /// Emit a warning when the tracked path count exceeds this threshold
    pub warn_above: Option<usize>,
}

/// Runs the scan+diff+enqueue cycle for a single registration
///
/// Sole owner of the root's snapshot store. The service funnels every signal
/// for a root through one dispatcher on one thread, so two diff passes never
/// run concurrently for the same root; distinct roots dispatch in parallel.
pub struct Dispatcher {
    root: PathBuf,
    store: SnapshotStore,
    key: WatchKey,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(root: PathBuf, store: SnapshotStore, key: WatchKey, options: DispatchOptions) -> Self {
        Self {
            root,
            store,
            key,
            options,
        }
    }

    /// The diff baseline as of the last completed cycle
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Handle one "subtree may have changed" signal
    ///
    /// Returns true when the owning key transitioned to signalled and must
    /// be published to the service's ready queue.
    pub fn dispatch(&mut self, changed: &Path) -> bool {
        if !self.key.is_valid() {
            return false;
        }

        if let Some(relevant) = &self.options.relevance {
            if !relevant(changed) {
                debug!(path = %changed.display(), "signal dropped by relevance predicate");
                return false;
            }
        }

        // Native sources occasionally report paths outside the registered
        // root (symlinked mounts, parent moves); clamp before scanning.
        let subtree = if changed.starts_with(&self.root) {
            changed
        } else {
            self.root.as_path()
        };

        let started = Instant::now();
        let fresh = scan_tree(subtree, self.options.include.as_ref());
        let scanned = fresh.len();
        let delta = self.store.apply_scan(subtree, fresh);

        debug!(
            root = %self.root.display(),
            subtree = %subtree.display(),
            scanned,
            created = delta.created.len(),
            modified = delta.modified.len(),
            deleted = delta.deleted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch cycle"
        );

        if let Some(limit) = self.options.warn_above {
            if self.store.len() > limit {
                warn!(
                    root = %self.root.display(),
                    watched = self.store.len(),
                    limit,
                    "watched path count exceeds warning threshold"
                );
            }
        }

        // The store above was updated for every kind; the mask only decides
        // what gets delivered.
        let kinds = self.key.kinds();
        let mut publish = false;
        if kinds.contains(EventKind::Create) {
            for path in delta.created {
                publish |= self.key.enqueue(EventKind::Create, path);
            }
        }
        if kinds.contains(EventKind::Modify) {
            for path in delta.modified {
                publish |= self.key.enqueue(EventKind::Modify, path);
            }
        }
        if kinds.contains(EventKind::Delete) {
            for path in delta.deleted {
                publish |= self.key.enqueue(EventKind::Delete, path);
            }
        }
        publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vigil_core::EventKinds;

    fn dispatcher_for(root: &Path, kinds: EventKinds, options: DispatchOptions) -> Dispatcher {
        let store = SnapshotStore::new(scan_tree(root, options.include.as_ref()));
        let key = WatchKey::new(root.to_path_buf(), kinds);
        Dispatcher::new(root.to_path_buf(), store, key, options)
    }

    #[test]
    fn test_created_file_reported_exactly_once() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.txt"), b"a").unwrap();

        let mut dispatcher = dispatcher_for(root, EventKinds::all(), DispatchOptions::default());
        fs::write(root.join("b.txt"), b"b").unwrap();

        assert!(dispatcher.dispatch(root));

        let events = dispatcher.key.poll_events();
        let creates: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Create)
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].path, root.join("b.txt"));

        // A second cycle with no disk change reports nothing.
        assert!(!dispatcher.dispatch(root));
        assert!(dispatcher.key.poll_events().is_empty());
    }

    #[test]
    fn test_deleting_whole_tree_reports_every_known_path() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("r");
        fs::create_dir(&root).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("sub/b.txt"), b"b").unwrap();

        let mut dispatcher = dispatcher_for(&root, EventKinds::all(), DispatchOptions::default());
        fs::remove_dir_all(&root).unwrap();

        assert!(dispatcher.dispatch(&root));

        let events = dispatcher.key.poll_events();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.kind == EventKind::Delete));
        assert!(dispatcher.store().is_empty());
    }

    #[test]
    fn test_relevance_predicate_drops_signal_before_scan() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let options = DispatchOptions {
            relevance: Some(Arc::new(|_: &Path| false)),
            ..Default::default()
        };
        let mut dispatcher = dispatcher_for(root, EventKinds::all(), options);

        fs::write(root.join("new.txt"), b"x").unwrap();
        assert!(!dispatcher.dispatch(root));

        // No scan ran: the store never learned about the new file.
        assert!(!dispatcher.store().contains(&root.join("new.txt")));
        assert_eq!(dispatcher.key.pending(), 0);
    }

    #[test]
    fn test_mask_suppresses_delivery_but_store_still_updates() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let delete_only = EventKinds::none().with(EventKind::Delete);
        let mut dispatcher = dispatcher_for(root, delete_only, DispatchOptions::default());

        fs::write(root.join("new.txt"), b"x").unwrap();
        assert!(!dispatcher.dispatch(root));

        assert_eq!(dispatcher.key.pending(), 0);
        assert!(dispatcher.store().contains(&root.join("new.txt")));
    }

    #[test]
    fn test_rewrite_with_restored_mtime_is_not_reported() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = root.join("a.txt");
        fs::write(&file, b"original").unwrap();
        let original = fs::metadata(&file).unwrap().modified().unwrap();

        let mut dispatcher = dispatcher_for(root, EventKinds::all(), DispatchOptions::default());

        // Content changes but the timestamp is put back: the coarse-grained
        // contract is that an equal mtime is never reported as a modify.
        fs::write(&file, b"rewritten").unwrap();
        filetime::set_file_mtime(&file, FileTime::from_system_time(original)).unwrap();

        assert!(!dispatcher.dispatch(root));
        assert!(dispatcher.key.poll_events().is_empty());
    }

    #[test]
    fn test_mtime_bump_reports_modify() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = root.join("a.txt");
        fs::write(&file, b"a").unwrap();
        let original = fs::metadata(&file).unwrap().modified().unwrap();

        let mut dispatcher = dispatcher_for(root, EventKinds::all(), DispatchOptions::default());

        let bumped = original + std::time::Duration::from_secs(10);
        filetime::set_file_mtime(&file, FileTime::from_system_time(bumped)).unwrap();

        assert!(dispatcher.dispatch(root));
        let events = dispatcher.key.poll_events();
        let modifies: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Modify)
            .collect();
        assert_eq!(modifies.len(), 1);
        assert_eq!(modifies[0].path, file);
    }

    #[test]
    fn test_excluded_directory_changes_are_invisible() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("skip")).unwrap();

        let options = DispatchOptions {
            include: Some(Arc::new(|path: &Path| !path.ends_with("skip"))),
            ..Default::default()
        };
        let mut dispatcher = dispatcher_for(root, EventKinds::all(), options);

        fs::write(root.join("skip/hidden.txt"), b"x").unwrap();
        assert!(!dispatcher.dispatch(root));
        assert_eq!(dispatcher.key.pending(), 0);
        assert!(!dispatcher.store().contains(&root.join("skip/hidden.txt")));
    }

    #[test]
    fn test_signal_outside_root_is_clamped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("r");
        fs::create_dir(&root).unwrap();

        let mut dispatcher = dispatcher_for(&root, EventKinds::all(), DispatchOptions::default());

        fs::write(root.join("a.txt"), b"a").unwrap();
        assert!(dispatcher.dispatch(Path::new("/somewhere/else")));

        let events = dispatcher.key.poll_events();
        assert!(events.iter().any(|e| e.path == root.join("a.txt")));
    }
}
