//! Pluggable change-notification sources
//!
//! The service only needs a best-effort, coalesced stream of "this subtree
//! may have changed" signals; per-file granularity and ordering are not
//! required, and false positives are fine (the next scan simply produces an
//! empty delta). [`NotifySource`] is the production implementation on top of
//! the platform notification API; tests substitute a manual source.

use crossbeam_channel::Sender;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use vigil_core::{Error, Result};

/// A stream of coarse change signals for registered roots
pub trait ChangeSource: Send + Sync {
    /// Begin delivering signals for `root` into `tx`
    ///
    /// Delivery stops when the returned subscription is dropped. Setup
    /// failures propagate out of registration as [`Error::Io`].
    fn subscribe(&self, root: &Path, tx: Sender<PathBuf>) -> Result<Box<dyn Subscription>>;
}

/// Live native-stream handle; dropping it stops signal delivery
pub trait Subscription: Send {}

/// Production source backed by the platform notification API
/// (inotify / FSEvents / ReadDirectoryChangesW, via the `notify` crate)
#[derive(Debug, Default)]
pub struct NotifySource;

struct NotifySubscription {
    _watcher: RecommendedWatcher,
}

impl Subscription for NotifySubscription {}

impl ChangeSource for NotifySource {
    fn subscribe(&self, root: &Path, tx: Sender<PathBuf>) -> Result<Box<dyn Subscription>> {
        let root = root.to_path_buf();
        let callback_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |outcome: notify::Result<notify::Event>| match outcome {
                Ok(event) => {
                    for path in &event.paths {
                        // Send failures mean the registration is being torn
                        // down; stale signals are dropped.
                        let _ = tx.send(signal_dir(&callback_root, path));
                    }
                }
                // Errors after setup are best-effort territory: the next
                // successful signal rescans and reconciles anything missed.
                Err(err) => warn!(error = %err, "native watcher stream error"),
            },
            notify::Config::default(),
        )
        .map_err(|err| Error::Io(io::Error::other(err)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| Error::Io(io::Error::other(err)))?;

        Ok(Box::new(NotifySubscription { _watcher: watcher }))
    }
}

/// Map a natively-reported path to the directory the dispatcher rescans:
/// the enclosing directory for anything below the root, clamped to the root
/// itself otherwise. Widening is always safe; narrowing never happens.
fn signal_dir(root: &Path, reported: &Path) -> PathBuf {
    if reported == root || !reported.starts_with(root) {
        return root.to_path_buf();
    }
    match reported.parent() {
        Some(parent) if parent.starts_with(root) => parent.to_path_buf(),
        _ => root.to_path_buf(),
    }
}
