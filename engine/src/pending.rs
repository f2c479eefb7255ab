//! Pending writes - local writes issued but not yet reported back.
//!
//! A subscribed replica hears about its own writes a second time, when the
//! remote store reports the resulting child events. Every planned write is
//! queued here with the remote state it leaves behind; a child event that
//! matches a queued state is that write's echo and is absorbed instead of
//! applied.
//!
//! The store reports nothing for a write that changed nothing, so a match
//! also retires every older entry queued before it.

use crate::{Attributes, Priority, RecordId, RemoteWrite, Snapshot};
use std::collections::{HashMap, HashSet, VecDeque};

/// Remote state of one child after a write lands.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// The child holds these attributes and this priority
    Value {
        attributes: Attributes,
        priority: Option<Priority>,
    },
    /// The child is gone
    Removed,
}

impl Expected {
    /// State a write leaves behind, given the attributes it produces.
    ///
    /// A partial write is only planned for records without priority.
    pub fn after(write: &RemoteWrite, attributes: Option<Attributes>) -> Self {
        match (write, attributes) {
            (RemoteWrite::WithPriority { priority, .. }, Some(attributes)) => Expected::Value {
                attributes,
                priority: Some(priority.clone()),
            },
            (_, Some(attributes)) => Expected::Value {
                attributes,
                priority: None,
            },
            (_, None) => Expected::Removed,
        }
    }

    /// State reported by a snapshot.
    pub fn of(snapshot: &Snapshot) -> Self {
        Expected::Value {
            attributes: snapshot.record_attributes(),
            priority: snapshot.priority.clone(),
        }
    }

    fn priority(&self) -> Option<&Priority> {
        match self {
            Expected::Value { priority, .. } => priority.as_ref(),
            Expected::Removed => None,
        }
    }
}

/// Per-record queues of writes awaiting their echo.
#[derive(Debug, Default)]
pub struct PendingWrites {
    queues: HashMap<RecordId, VecDeque<Expected>>,
    /// Ids that saw a foreign event while writes were in flight
    interleaved: HashSet<RecordId>,
    /// Priority of the last absorbed echo, awaiting its move notification
    moves: HashMap<RecordId, Option<Priority>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the state a write will leave behind.
    pub fn push(&mut self, id: impl Into<RecordId>, expected: Expected) {
        self.queues.entry(id.into()).or_default().push_back(expected);
    }

    /// Whether a record has writes in flight.
    pub fn is_pending(&self, id: &str) -> bool {
        self.queues.contains_key(id)
    }

    /// Number of writes in flight, over all records.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Drop every write in flight for a record, e.g. after it failed.
    pub fn forget(&mut self, id: &str) {
        self.queues.remove(id);
        self.interleaved.remove(id);
        self.moves.remove(id);
    }

    /// Check a reported state against the writes in flight.
    ///
    /// Returns true when the event is an echo that must not be applied. A
    /// matching event after a foreign one is still retired but reported as
    /// false, so the replica converges on the store's final order.
    pub fn take_echo(&mut self, id: &str, seen: &Expected) -> bool {
        let Some(queue) = self.queues.get_mut(id) else {
            self.moves.remove(id);
            return false;
        };

        let Some(position) = queue.iter().position(|expected| expected == seen) else {
            self.interleaved.insert(id.to_string());
            self.moves.remove(id);
            return false;
        };

        queue.drain(..=position);
        if queue.is_empty() {
            self.queues.remove(id);
        }
        let foreign = if self.is_pending(id) {
            self.interleaved.contains(id)
        } else {
            self.interleaved.remove(id)
        };

        if foreign {
            self.moves.remove(id);
            false
        } else {
            if !matches!(seen, Expected::Removed) {
                self.moves.insert(id.to_string(), seen.priority().cloned());
            }
            true
        }
    }

    /// Whether a move notification follows an absorbed echo.
    pub fn take_move(&mut self, id: &str, priority: Option<&Priority>) -> bool {
        match self.moves.get(id) {
            Some(expected) if expected.as_ref() == priority => {
                self.moves.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.queues.clear();
        self.interleaved.clear();
        self.moves.clear();
    }
}
