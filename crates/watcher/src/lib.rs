//! Watch-service runtime for Vigil
//!
//! Builds on `vigil-core`'s scanner and diff engine:
//! - [`WatchKey`]: per-registration token carrying the pending-event queue
//! - [`dispatch::Dispatcher`]: per-root scan+diff+enqueue cycle
//! - [`ChangeSource`]: pluggable native notification stream (notify-backed)
//! - [`WatchService`]: registration, ready-key retrieval, shutdown

pub mod dispatch;
pub mod key;
pub mod service;
pub mod source;

// Re-exports
pub use key::WatchKey;
pub use service::{WatchRequest, WatchService};
pub use source::{ChangeSource, NotifySource, Subscription};

pub use vigil_core::{Error, Event, EventKind, EventKinds, Result};
