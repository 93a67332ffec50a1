//! Watch keys: per-registration tokens carrying pending events

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vigil_core::{Event, EventKind, EventKinds};

/// Delivery state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    /// Registered with a drained queue, eligible for signalling
    Ready,
    /// Published to the service ready queue, not yet drained
    Signalled,
    /// Cancelled (directly or via service close); no further delivery
    Cancelled,
}

struct KeyInner {
    state: KeyState,
    events: VecDeque<Event>,
    /// Tears down the owning registration (stop the native stream, join the
    /// dispatcher thread); installed by the service, consumed by `cancel`.
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

/// Token representing one active registration
///
/// Cloneable handle: the dispatcher enqueues events on one side while
/// consumers drain them with [`WatchKey::poll_events`]. Two clones compare
/// equal when they refer to the same registration.
#[derive(Clone)]
pub struct WatchKey {
    shared: Arc<KeyShared>,
}

struct KeyShared {
    root: PathBuf,
    kinds: EventKinds,
    inner: Mutex<KeyInner>,
}

impl WatchKey {
    pub(crate) fn new(root: PathBuf, kinds: EventKinds) -> Self {
        Self {
            shared: Arc::new(KeyShared {
                root,
                kinds,
                inner: Mutex::new(KeyInner {
                    state: KeyState::Ready,
                    events: VecDeque::new(),
                    canceller: None,
                }),
            }),
        }
    }

    /// The registered root path
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// The subscription mask this registration was created with
    pub fn kinds(&self) -> EventKinds {
        self.shared.kinds
    }

    /// True until the key is cancelled or the owning service closes
    pub fn is_valid(&self) -> bool {
        self.shared.inner.lock().state != KeyState::Cancelled
    }

    /// Number of queued, undrained events
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().events.len()
    }

    /// Atomically detach and return all queued events
    ///
    /// Re-arms the key for future signals (so it can be published to the
    /// ready queue again) unless it has been cancelled, in which case the
    /// backlog is returned one final time and the key stays cancelled.
    pub fn poll_events(&self) -> Vec<Event> {
        let mut inner = self.shared.inner.lock();
        let events = inner.events.drain(..).collect();
        if inner.state == KeyState::Signalled {
            inner.state = KeyState::Ready;
        }
        events
    }

    /// Cancel this registration
    ///
    /// Idempotent. Stops the native stream and the dispatcher thread before
    /// returning, so no event is delivered after this call. Already-queued
    /// events are preserved: the caller may still drain the backlog with one
    /// final [`WatchKey::poll_events`].
    pub fn cancel(&self) {
        let canceller = {
            let mut inner = self.shared.inner.lock();
            inner.state = KeyState::Cancelled;
            inner.canceller.take()
        };
        // Runs outside the key lock: teardown joins the dispatcher thread,
        // which may be blocked trying to enqueue on this very key.
        if let Some(teardown) = canceller {
            teardown();
        }
    }

    /// Enqueue an event, coalescing repeats of the newest kind+path pair
    ///
    /// Returns true when the key transitioned to signalled and should be
    /// published to the service's ready queue (at most once until drained).
    pub(crate) fn enqueue(&self, kind: EventKind, path: PathBuf) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state == KeyState::Cancelled {
            return false;
        }

        if let Some(last) = inner.events.back_mut() {
            if last.kind == kind && last.path == path {
                last.count += 1;
                return false;
            }
        }
        inner.events.push_back(Event::new(kind, path));

        if inner.state == KeyState::Ready {
            inner.state = KeyState::Signalled;
            true
        } else {
            false
        }
    }

    /// Invalidate without running the teardown closure; used by service
    /// close, which tears the registration down itself.
    pub(crate) fn mark_cancelled(&self) {
        let mut inner = self.shared.inner.lock();
        inner.state = KeyState::Cancelled;
        inner.canceller = None;
    }

    pub(crate) fn install_canceller(&self, teardown: Box<dyn FnOnce() + Send>) {
        self.shared.inner.lock().canceller = Some(teardown);
    }
}

impl PartialEq for WatchKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for WatchKey {}

impl fmt::Debug for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("WatchKey")
            .field("root", &self.shared.root)
            .field("state", &inner.state)
            .field("pending", &inner.events.len())
            .finish()
    }
}
