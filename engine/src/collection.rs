//! Collection - the ordered in-memory record container.
//!
//! Holds one record per id, keeps them in a stable order, and notifies
//! registered listeners about every mutation unless asked to stay silent.

use crate::{priority, Priority, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How records are ordered in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// By id (default)
    #[default]
    Id,
    /// Like the remote store: by priority, then id
    Priority,
}

impl SortOrder {
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            SortOrder::Id => a.id.cmp(&b.id),
            SortOrder::Priority => {
                priority::compare(a.priority(), b.priority()).then_with(|| a.id.cmp(&b.id))
            }
        }
    }
}

/// A notification emitted by the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionEvent {
    /// A record was inserted
    Add { id: RecordId },
    /// A record was removed
    Remove { id: RecordId },
    /// Fields of a record changed
    Change { id: RecordId, fields: Vec<String> },
    /// A record's priority changed
    Move {
        id: RecordId,
        priority: Option<Priority>,
    },
    /// The whole contents were replaced
    Reset,
    /// The collection caught up with the remote store
    Sync,
}

impl CollectionEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            CollectionEvent::Add { .. } => EventKind::Add,
            CollectionEvent::Remove { .. } => EventKind::Remove,
            CollectionEvent::Change { .. } => EventKind::Change,
            CollectionEvent::Move { .. } => EventKind::Move,
            CollectionEvent::Reset => EventKind::Reset,
            CollectionEvent::Sync => EventKind::Sync,
        }
    }
}

/// Filter for listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Remove,
    Change,
    Move,
    Reset,
    Sync,
    /// Every event
    All,
}

impl EventKind {
    fn matches(&self, event: &CollectionEvent) -> bool {
        *self == EventKind::All || *self == event.kind()
    }
}

/// Handle returned by [`Collection::on`].
pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&CollectionEvent) + Send>;

/// The ordered record container.
#[derive(Default)]
pub struct Collection {
    records: HashMap<RecordId, Record>,
    /// Ids in sort order
    order: Vec<RecordId>,
    sort: SortOrder,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    next_listener: ListenerId,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("records", &self.order)
            .field("sort", &self.sort)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Collection {
    /// Create an empty collection ordered by id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection with the given order.
    pub fn with_order(sort: SortOrder) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    /// The ordering in use.
    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    /// Register a listener for one kind of event (or [`EventKind::All`]).
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&CollectionEvent) + Send + 'static,
    {
        self.next_listener += 1;
        let id = self.next_listener;
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver an event to matching listeners unless `silent`.
    pub fn notify(&mut self, event: CollectionEvent, silent: bool) {
        if silent {
            return;
        }
        for (_, kind, listener) in self.listeners.iter_mut() {
            if kind.matches(&event) {
                listener(&event);
            }
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Get a mutable record by id.
    ///
    /// Call [`Collection::reposition`] afterwards if the priority changed.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a record at its sorted position.
    ///
    /// Returns false and leaves the collection untouched if the id is taken.
    pub fn insert(&mut self, record: Record, silent: bool) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        let position = self.position_for(&record);
        let id = record.id.clone();
        self.order.insert(position, id.clone());
        self.records.insert(id.clone(), record);
        self.notify(CollectionEvent::Add { id }, silent);
        true
    }

    /// Remove a record by id.
    pub fn remove(&mut self, id: &str, silent: bool) -> Option<Record> {
        let record = self.records.remove(id)?;
        self.order.retain(|other| other != id);
        self.notify(
            CollectionEvent::Remove {
                id: record.id.clone(),
            },
            silent,
        );
        Some(record)
    }

    /// Remove every record, emitting one `Reset` unless `silent`.
    pub fn clear(&mut self, silent: bool) -> Vec<Record> {
        let order = std::mem::take(&mut self.order);
        let mut removed = Vec::with_capacity(order.len());
        for id in order {
            if let Some(record) = self.records.remove(&id) {
                removed.push(record);
            }
        }
        self.notify(CollectionEvent::Reset, silent);
        removed
    }

    /// Move a record to where its current sort key belongs.
    pub fn reposition(&mut self, id: &str) {
        let Some(index) = self.order.iter().position(|other| other == id) else {
            return;
        };
        let id = self.order.remove(index);
        let position = match self.records.get(&id) {
            Some(record) => self.position_for(record),
            None => return,
        };
        self.order.insert(position, id);
    }

    /// Records in sort order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Ids in sort order.
    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    /// Record at a sorted position.
    pub fn at(&self, index: usize) -> Option<&Record> {
        self.order.get(index).and_then(|id| self.records.get(id))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose attributes satisfy a predicate, in sort order.
    pub fn filter<F>(&self, predicate: F) -> Vec<&Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.iter().filter(|r| predicate(r)).collect()
    }

    fn position_for(&self, record: &Record) -> usize {
        let sort = self.sort;
        let records = &self.records;
        self.order
            .partition_point(|id| match records.get(id) {
                Some(other) => sort.compare(other, record) == Ordering::Less,
                None => true,
            })
    }
}
