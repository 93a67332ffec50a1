//! The watch-service facade
//!
//! Owns every active registration, the per-root dispatcher threads, and the
//! cross-registration ready-keys queue consumers drain through
//! `poll`/`take`. Scanning and diffing always happen on the registration's
//! own dispatcher thread, never while holding the service lock.

use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::key::WatchKey;
use crate::source::{ChangeSource, NotifySource, Subscription};
use crossbeam_channel::{bounded, select, unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use vigil_core::scan::{scan_tree, PathPredicate};
use vigil_core::snapshot::SnapshotStore;
use vigil_core::{Error, EventKinds, Result};

/// Per-registration options passed to [`WatchService::register`]
#[derive(Clone, Default)]
pub struct WatchRequest {
    kinds: EventKinds,
    include: Option<PathPredicate>,
    relevance: Option<PathPredicate>,
    warn_above: Option<usize>,
}

impl WatchRequest {
    /// Every event kind, no predicates
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict which event kinds are delivered
    pub fn kinds(mut self, kinds: EventKinds) -> Self {
        self.kinds = kinds;
        self
    }

    /// Only directories accepted by `include` are scanned and descended into
    pub fn include(mut self, include: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.include = Some(Arc::new(include));
        self
    }

    /// Change signals whose path is rejected are dropped without scanning
    pub fn relevant_if(
        mut self,
        relevance: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.relevance = Some(Arc::new(relevance));
        self
    }

    /// Warn when the watched path count exceeds `limit`
    pub fn warn_above(mut self, limit: usize) -> Self {
        self.warn_above = Some(limit);
        self
    }
}

struct Registration {
    key: WatchKey,
    subscription: Box<dyn Subscription>,
    shutdown_tx: Sender<()>,
    thread: JoinHandle<()>,
}

struct ServiceState {
    closed: bool,
    ready: VecDeque<WatchKey>,
    registrations: HashMap<u64, Registration>,
}

struct Shared {
    state: Mutex<ServiceState>,
    cond: Condvar,
    next_id: AtomicU64,
}

impl Shared {
    /// Called by dispatcher threads when a key transitions to signalled.
    /// Publication is at most once per signal cycle by construction: the key
    /// only reports the transition on its first undrained event.
    fn publish(&self, key: WatchKey) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.ready.push_back(key);
        self.cond.notify_one();
    }
}

/// Stop one registration's native stream and dispatcher thread
///
/// Safe to race with service close: whichever side removes the registration
/// from the table performs the teardown, the other finds nothing to do.
fn teardown_registration(shared: &Shared, id: u64) {
    let registration = shared.state.lock().registrations.remove(&id);
    if let Some(registration) = registration {
        registration.key.mark_cancelled();
        // Dropping the subscription stops native delivery; dropping the
        // shutdown sender unblocks the dispatcher loop. Join outside any
        // lock so an in-flight dispatch cycle can finish.
        drop(registration.subscription);
        drop(registration.shutdown_tx);
        let _ = registration.thread.join();
    }
}

/// Directory-change notification service
///
/// Callers register roots and retrieve signalled [`WatchKey`]s through
/// `poll`/`take`, then drain each key with [`WatchKey::poll_events`]. One
/// dispatcher thread per registration produces events; any number of
/// consumer threads may retrieve keys concurrently.
pub struct WatchService {
    shared: Arc<Shared>,
    source: Arc<dyn ChangeSource>,
}

impl WatchService {
    /// Create a service backed by the platform notification API
    pub fn new() -> Self {
        Self::with_source(Arc::new(NotifySource))
    }

    /// Create a service with a custom change source
    pub fn with_source(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState {
                    closed: false,
                    ready: VecDeque::new(),
                    registrations: HashMap::new(),
                }),
                cond: Condvar::new(),
                next_id: AtomicU64::new(0),
            }),
            source,
        }
    }

    /// Register `root` for watching
    ///
    /// Scans the tree synchronously to seed the diff baseline before
    /// returning, so the first signal after registration diffs against a
    /// consistent snapshot. Fails with [`Error::Io`] when the root cannot be
    /// read or the change stream cannot be set up.
    pub fn register(&self, root: &Path, request: WatchRequest) -> Result<WatchKey> {
        if self.shared.state.lock().closed {
            return Err(Error::Closed);
        }

        // An unreadable root fails registration up front; races during later
        // scans are absorbed as partial results instead.
        let root = root.canonicalize()?;
        if fs::metadata(&root)?.is_dir() {
            fs::read_dir(&root)?;
        }

        let baseline = scan_tree(&root, request.include.as_ref());
        let tracked = baseline.len();
        if let Some(limit) = request.warn_above {
            if tracked > limit {
                warn!(
                    root = %root.display(),
                    watched = tracked,
                    limit,
                    "watched path count exceeds warning threshold"
                );
            }
        }

        let key = WatchKey::new(root.clone(), request.kinds);
        let (signal_tx, signal_rx) = unbounded::<PathBuf>();
        let subscription = self.source.subscribe(&root, signal_tx)?;
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let mut dispatcher = Dispatcher::new(
            root.clone(),
            SnapshotStore::new(baseline),
            key.clone(),
            DispatchOptions {
                include: request.include,
                relevance: request.relevance,
                warn_above: request.warn_above,
            },
        );

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let publisher = Arc::downgrade(&self.shared);
        let publish_key = key.clone();
        let thread = thread::Builder::new()
            .name(format!("vigil-dispatch-{id}"))
            .spawn(move || loop {
                select! {
                    recv(signal_rx) -> signal => match signal {
                        Ok(path) => {
                            if dispatcher.dispatch(&path) {
                                if let Some(shared) = publisher.upgrade() {
                                    shared.publish(publish_key.clone());
                                }
                            }
                        }
                        Err(_) => break,
                    },
                    recv(shutdown_rx) -> _ => break,
                }
            })?;

        let canceller_shared = Arc::downgrade(&self.shared);
        key.install_canceller(Box::new(move || {
            if let Some(shared) = canceller_shared.upgrade() {
                teardown_registration(&shared, id);
            }
        }));

        {
            let mut state = self.shared.state.lock();
            if state.closed {
                drop(state);
                // Lost the race with close(): undo the half-built registration.
                key.mark_cancelled();
                drop(subscription);
                drop(shutdown_tx);
                let _ = thread.join();
                return Err(Error::Closed);
            }
            state.registrations.insert(
                id,
                Registration {
                    key: key.clone(),
                    subscription,
                    shutdown_tx,
                    thread,
                },
            );
        }

        info!(root = %root.display(), paths = tracked, "watch registered");
        Ok(key)
    }

    /// Retrieve one signalled key without blocking, or `None`
    pub fn poll(&self) -> Result<Option<WatchKey>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(state.ready.pop_front())
    }

    /// Retrieve one signalled key, waiting up to `timeout`
    ///
    /// Returns `None` on expiry; fails with [`Error::Closed`] if the service
    /// closes while waiting.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<WatchKey>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            if let Some(key) = state.ready.pop_front() {
                return Ok(Some(key));
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return Err(Error::Closed);
                        }
                        return Ok(state.ready.pop_front());
                    }
                }
                // Deadline beyond what the clock can represent: wait untimed.
                None => self.shared.cond.wait(&mut state),
            }
        }
    }

    /// Retrieve one signalled key, waiting indefinitely
    ///
    /// Fails with [`Error::Closed`] if the service closes while waiting;
    /// every blocked caller is woken.
    pub fn take(&self) -> Result<WatchKey> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            if let Some(key) = state.ready.pop_front() {
                return Ok(key);
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Shut the service down
    ///
    /// Idempotent. Stops every native stream, joins every dispatcher thread,
    /// cancels every key, and wakes every consumer blocked in `poll`/`take`
    /// with [`Error::Closed`].
    pub fn close(&self) {
        let registrations = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            self.shared.cond.notify_all();
            std::mem::take(&mut state.registrations)
        };

        info!(registrations = registrations.len(), "closing watch service");
        for (_, registration) in registrations {
            registration.key.mark_cancelled();
            drop(registration.subscription);
            drop(registration.shutdown_tx);
            let _ = registration.thread.join();
        }
    }
}

impl Default for WatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.close();
    }
}
