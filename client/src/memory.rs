//! In-memory remote store.
//!
//! Holds the children of every location in a concurrent map and fans child
//! events out to subscribers, the way a real store pushes them over its
//! connection. Every write is recorded in a log, and writes can be switched
//! to fail, so tests can observe exactly what a controller sent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tandem_engine::{
    priority, ChildEvent, KeyGenerator, Patch, Priority, RecordId, Snapshot,
};
use tokio::sync::mpsc;

use crate::config::validate_key;
use crate::error::RemoteError;
use crate::remote::{split_path, RemoteEvent, RemoteStore, Subscription, SubscriptionId};

/// Sender for subscription events.
type EventSender = mpsc::UnboundedSender<RemoteEvent>;

/// A stored child value.
#[derive(Debug, Clone, PartialEq)]
struct Stored {
    value: Value,
    priority: Option<Priority>,
}

/// A single subscriber.
#[derive(Debug)]
struct Subscriber {
    /// Location whose children are watched
    path: String,
    sender: EventSender,
}

/// One write primitive invoked on the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteEntry {
    /// `write_whole`, `write_priority`, `write_partial` or `remove`
    pub kind: &'static str,
    pub path: String,
    /// Value or patch sent; `null` for a removal
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// In-memory remote store.
///
/// Thread-safe and can be shared across controllers via `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Children of every location, keyed by location path
    locations: DashMap<String, BTreeMap<RecordId, Stored>>,
    /// Active subscriptions, keyed by subscription ID
    subscribers: DashMap<SubscriptionId, Subscriber>,
    writes: Mutex<Vec<WriteEntry>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every successful write so far, in order.
    pub fn writes(&self) -> Vec<WriteEntry> {
        self.writes.lock().clone()
    }

    /// Forget the write log.
    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Current value at a child path.
    pub fn value(&self, path: &str) -> Option<Value> {
        let (parent, key) = split_path(path).ok()?;
        let children = self.locations.get(parent)?;
        children.get(key).map(|stored| stored.value.clone())
    }

    /// Current priority at a child path.
    pub fn priority(&self, path: &str) -> Option<Priority> {
        let (parent, key) = split_path(path).ok()?;
        let children = self.locations.get(parent)?;
        children.get(key).and_then(|stored| stored.priority.clone())
    }

    /// Number of children at a location.
    pub fn child_count(&self, path: &str) -> usize {
        self.locations
            .get(path)
            .map(|children| children.len())
            .unwrap_or(0)
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn check_writable(&self, path: &str) -> Result<(String, RecordId), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::PermissionDenied(path.to_string()));
        }
        let (parent, key) = split_path(path)?;
        validate_key(key).map_err(|e| RemoteError::InvalidPath(e.to_string()))?;
        Ok((parent.to_string(), key.to_string()))
    }

    fn log(&self, kind: &'static str, path: &str, payload: Value, priority: Option<Priority>) {
        self.writes.lock().push(WriteEntry {
            kind,
            path: path.to_string(),
            payload,
            priority,
        });
    }

    /// Compute a child's next value under the location lock, store it (or
    /// delete it on `None`) and notify subscribers.
    ///
    /// Notifications go out before the lock is released, so subscribers see
    /// the writes to a location in storage order.
    fn update<F>(&self, parent: &str, key: &str, next: F)
    where
        F: FnOnce(Option<&Stored>) -> Option<Stored>,
    {
        let mut children = self.locations.entry(parent.to_string()).or_default();
        let previous = children.get(key).cloned();
        let current = next(previous.as_ref());
        match &current {
            Some(stored) => children.insert(key.to_string(), stored.clone()),
            None => children.remove(key),
        };

        for event in child_events(key, previous, current) {
            self.broadcast(parent, event);
        }

        let empty = children.is_empty();
        drop(children);
        if empty {
            self.locations
                .remove_if(parent, |_, children| children.is_empty());
        }
    }

    /// Send an event to every subscriber of a location.
    ///
    /// Returns the number of subscribers that received it.
    fn broadcast(&self, parent: &str, event: ChildEvent) -> usize {
        let mut sent_count = 0;

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if subscriber.path == parent
                && subscriber.sender.send(RemoteEvent::Child(event.clone())).is_ok()
            {
                sent_count += 1;
            }
        }

        tracing::trace!(
            path = %parent,
            event = event.kind(),
            key = %event.key(),
            recipients = sent_count,
            "Broadcast child event"
        );

        sent_count
    }

    /// Children of a location in store order.
    fn ordered_children(&self, path: &str) -> Vec<Snapshot> {
        match self.locations.get(path) {
            Some(children) => ordered(&children),
            None => Vec::new(),
        }
    }
}

impl KeyGenerator for MemoryStore {
    fn generate_key(&self) -> RecordId {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read_once(&self, path: &str) -> Result<Vec<Snapshot>, RemoteError> {
        Ok(self.ordered_children(path))
    }

    async fn write_whole(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let (parent, key) = self.check_writable(path)?;
        self.log("write_whole", path, value.clone(), None);
        self.update(&parent, &key, |_| stored(value, None));
        Ok(())
    }

    async fn write_priority(
        &self,
        path: &str,
        value: Value,
        priority: Priority,
    ) -> Result<(), RemoteError> {
        let (parent, key) = self.check_writable(path)?;
        self.log("write_priority", path, value.clone(), Some(priority.clone()));
        self.update(&parent, &key, |_| stored(value, Some(priority)));
        Ok(())
    }

    async fn write_partial(&self, path: &str, patch: Patch) -> Result<(), RemoteError> {
        let (parent, key) = self.check_writable(path)?;
        self.log("write_partial", path, patch.to_value(), None);

        self.update(&parent, &key, |existing| {
            let (mut fields, priority) = match existing {
                Some(Stored {
                    value: Value::Object(map),
                    priority,
                }) => (map.clone(), priority.clone()),
                Some(Stored { priority, .. }) => (Default::default(), priority.clone()),
                None => (Default::default(), None),
            };
            patch.apply_to(&mut fields);
            stored(Value::Object(fields), priority)
        });
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), RemoteError> {
        let (parent, key) = self.check_writable(path)?;
        self.log("remove", path, Value::Null, None);
        self.update(&parent, &key, |_| None);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = uuid::Uuid::new_v4().to_string();

        // Writers notify while holding the location, so registering under it
        // means every change is either replayed or delivered, in order.
        let children = self.locations.entry(path.to_string()).or_default();
        for snapshot in ordered(&children) {
            let _ = tx.send(RemoteEvent::Child(ChildEvent::Added(snapshot)));
        }
        let _ = tx.send(RemoteEvent::Ready);

        self.subscribers.insert(
            id.clone(),
            Subscriber {
                path: path.to_string(),
                sender: tx,
            },
        );
        drop(children);

        tracing::info!(subscription = %id, path = %path, "Subscription registered");

        Ok(Subscription::new(id, rx))
    }

    fn unsubscribe(&self, id: &SubscriptionId) {
        if let Some((_, subscriber)) = self.subscribers.remove(id) {
            tracing::info!(subscription = %id, path = %subscriber.path, "Subscription removed");
        }
    }
}

/// A stored child for a written value; `None` when the write deletes it.
fn stored(value: Value, priority: Option<Priority>) -> Option<Stored> {
    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        None
    } else {
        Some(Stored { value, priority })
    }
}

/// Snapshots of a set of children: by priority, then key.
fn ordered(children: &BTreeMap<RecordId, Stored>) -> Vec<Snapshot> {
    let mut snapshots: Vec<Snapshot> = children
        .iter()
        .map(|(key, stored)| snapshot(key, stored))
        .collect();
    snapshots.sort_by(|a, b| {
        priority::compare(a.priority.as_ref(), b.priority.as_ref())
            .then_with(|| a.key.cmp(&b.key))
    });
    snapshots
}

fn snapshot(key: &str, stored: &Stored) -> Snapshot {
    Snapshot {
        key: key.to_string(),
        value: stored.value.clone(),
        priority: stored.priority.clone(),
    }
}

/// Child events describing the transition of one child.
fn child_events(key: &str, previous: Option<Stored>, current: Option<Stored>) -> Vec<ChildEvent> {
    match (previous, current) {
        (None, Some(current)) => vec![ChildEvent::Added(snapshot(key, &current))],
        (Some(previous), None) => vec![ChildEvent::Removed(snapshot(key, &previous))],
        (Some(previous), Some(current)) => {
            let mut events = Vec::new();
            if previous != current {
                events.push(ChildEvent::Changed(snapshot(key, &current)));
            }
            if previous.priority != current.priority {
                events.push(ChildEvent::Moved(snapshot(key, &current)));
            }
            events
        }
        (None, None) => Vec::new(),
    }
}
