//! Filesystem event model and subscription masks

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Entry appeared under the watched root
    Create,
    /// Entry's modification timestamp changed
    Modify,
    /// Entry disappeared from the watched root
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

/// A discrete filesystem change delivered to a consumer
///
/// `count` starts at 1 and is incremented when a repeat of the same
/// kind+path arrives while this event is still the newest queued entry, so
/// rapid rewrites of one file coalesce into a single event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Absolute path of the affected entry
    pub path: PathBuf,
    /// Coalesced repeat count (>= 1)
    pub count: u32,
}

impl Event {
    pub fn new(kind: EventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            count: 1,
        }
    }
}

/// Subscription mask: the subset of event kinds a registration wants reported
///
/// The diff baseline is maintained for all kinds regardless of the mask;
/// masked-out kinds are simply not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKinds {
    create: bool,
    modify: bool,
    delete: bool,
}

impl EventKinds {
    /// Mask accepting every kind
    pub fn all() -> Self {
        Self {
            create: true,
            modify: true,
            delete: true,
        }
    }

    /// Mask accepting nothing; combine with [`EventKinds::with`]
    pub fn none() -> Self {
        Self {
            create: false,
            modify: false,
            delete: false,
        }
    }

    /// Add one kind to the mask
    pub fn with(mut self, kind: EventKind) -> Self {
        match kind {
            EventKind::Create => self.create = true,
            EventKind::Modify => self.modify = true,
            EventKind::Delete => self.delete = true,
        }
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Create => self.create,
            EventKind::Modify => self.modify,
            EventKind::Delete => self.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.create || self.modify || self.delete)
    }
}

impl Default for EventKinds {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_membership() {
        let kinds = EventKinds::none().with(EventKind::Create).with(EventKind::Delete);

        assert!(kinds.contains(EventKind::Create));
        assert!(kinds.contains(EventKind::Delete));
        assert!(!kinds.contains(EventKind::Modify));
        assert!(!kinds.is_empty());
    }

    #[test]
    fn test_default_mask_accepts_everything() {
        let kinds = EventKinds::default();

        assert!(kinds.contains(EventKind::Create));
        assert!(kinds.contains(EventKind::Modify));
        assert!(kinds.contains(EventKind::Delete));
    }

    #[test]
    fn test_empty_mask() {
        assert!(EventKinds::none().is_empty());
        assert!(!EventKinds::all().is_empty());
    }

    #[test]
    fn test_new_event_starts_at_count_one() {
        let event = Event::new(EventKind::Create, PathBuf::from("/r/a.txt"));
        assert_eq!(event.count, 1);
        assert_eq!(event.kind.as_str(), "create");
    }
}
