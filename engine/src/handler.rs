//! Remote child notification handlers.
//!
//! Each handler mirrors one kind of child event into the replica. Mutations
//! run with the record suppressed, so the write hooks plan nothing and a
//! remote change is never echoed back.
//!
//! Notifications produced by our own writes are absorbed when the replica
//! expects echoes (see [`crate::pending`]), even if later local mutations
//! already moved past them. Without that, handlers are still idempotent: an
//! `Added` for a known id is ignored, a `Removed` for an unknown id does
//! nothing, and a `Changed` that matches the local state emits no
//! notification.

use crate::{
    error::Result,
    guard::{self, ApplyOptions},
    pending::Expected,
    write, ChildEvent, CollectionEvent, Origin, Priority, Record, RecordId, Replica, Snapshot,
    PRIORITY_FIELD,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// What a handler did to the replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Applied {
    /// A new record was inserted
    Inserted,
    /// An existing record changed
    Updated { fields: Vec<String> },
    /// The notification matched the local state
    Unchanged,
    /// A record was removed
    Removed,
    /// A record's priority was set
    Moved { priority: Option<Priority> },
    /// Nothing to do (known id on add, unknown id on remove or move)
    Ignored,
    /// A change arrived for an unknown id and was applied as an add
    Recovered,
    /// The notification reported one of our own writes
    Echoed,
}

impl Replica {
    /// Apply one child notification.
    pub fn apply(&mut self, event: ChildEvent, options: ApplyOptions) -> Result<Applied> {
        match event {
            ChildEvent::Added(snapshot) => Ok(self.on_child_added(snapshot, options)),
            ChildEvent::Changed(snapshot) => self.on_child_changed(snapshot, options),
            ChildEvent::Removed(snapshot) => Ok(self.on_child_removed(snapshot, options)),
            ChildEvent::Moved(snapshot) => Ok(self.on_child_moved(snapshot, options)),
        }
    }

    /// A child appeared at the remote location.
    pub fn on_child_added(&mut self, snapshot: Snapshot, options: ApplyOptions) -> Applied {
        if self.pending.take_echo(&snapshot.key, &Expected::of(&snapshot)) {
            return Applied::Echoed;
        }
        if self.collection.contains(&snapshot.key) {
            return Applied::Ignored;
        }
        let options = remote(options);

        let mut record = Record::from_snapshot(&snapshot);
        let echo = guard::apply_with(&mut record, options, |record| write::plan_create(record));
        debug_assert!(echo.is_none());

        self.shadows
            .insert(snapshot.key.clone(), snapshot.record_attributes());
        self.collection.insert(record, options.silent);
        Applied::Inserted
    }

    /// A child's value changed at the remote location.
    ///
    /// An unknown id means the local state drifted; the snapshot is inserted
    /// as if it had been added.
    pub fn on_child_changed(&mut self, snapshot: Snapshot, options: ApplyOptions) -> Result<Applied> {
        if self.pending.take_echo(&snapshot.key, &Expected::of(&snapshot)) {
            return Ok(Applied::Echoed);
        }
        if !self.collection.contains(&snapshot.key) {
            self.on_child_added(snapshot, options);
            return Ok(Applied::Recovered);
        }
        let options = remote(options);

        let attributes = snapshot.record_attributes();
        let priority = snapshot.priority.clone();
        let (fields, echo) = self.change(&snapshot.key, options, |record| {
            let mut changed = record.replace(attributes.clone())?;
            if record.set_priority(priority) {
                changed.push(PRIORITY_FIELD.to_string());
                changed.sort();
            }
            Ok(changed)
        })?;
        debug_assert!(echo.is_none());

        self.shadows.insert(snapshot.key, attributes);
        if fields.is_empty() {
            Ok(Applied::Unchanged)
        } else {
            Ok(Applied::Updated { fields })
        }
    }

    /// A child was deleted at the remote location.
    pub fn on_child_removed(&mut self, snapshot: Snapshot, options: ApplyOptions) -> Applied {
        if self.pending.take_echo(&snapshot.key, &Expected::Removed) {
            return Applied::Echoed;
        }
        self.shadows.remove(&snapshot.key);
        match self.collection.remove(&snapshot.key, options.silent) {
            Some(_) => Applied::Removed,
            None => Applied::Ignored,
        }
    }

    /// A child's ordering priority changed at the remote location.
    pub fn on_child_moved(&mut self, snapshot: Snapshot, options: ApplyOptions) -> Applied {
        if self.pending.take_move(&snapshot.key, snapshot.priority.as_ref()) {
            return Applied::Echoed;
        }
        let options = remote(options);
        let Some(record) = self.collection.get_mut(&snapshot.key) else {
            return Applied::Ignored;
        };

        let priority = snapshot.priority;
        let moved = guard::apply_with(record, options, |record| {
            record.set_priority(priority.clone())
        });
        if moved {
            self.collection.reposition(&snapshot.key);
        }
        self.collection.notify(
            CollectionEvent::Move {
                id: snapshot.key,
                priority: priority.clone(),
            },
            options.silent,
        );
        Applied::Moved { priority }
    }

    /// Bring the replica in line with a full read of the remote location.
    ///
    /// Every snapshot is applied as an add or a change; records with no
    /// snapshot are removed.
    pub fn load(&mut self, snapshots: Vec<Snapshot>, options: ApplyOptions) -> Result<Vec<Applied>> {
        let present: HashSet<RecordId> = snapshots.iter().map(|s| s.key.clone()).collect();
        let stale: Vec<RecordId> = self
            .collection
            .ids()
            .iter()
            .filter(|id| !present.contains(*id))
            .cloned()
            .collect();

        let mut outcomes = Vec::with_capacity(snapshots.len() + stale.len());
        for id in stale {
            outcomes.push(self.on_child_removed(Snapshot::new(id, Value::Null), options));
        }
        for snapshot in snapshots {
            let applied = if self.collection.contains(&snapshot.key) {
                self.on_child_changed(snapshot, options)?
            } else {
                self.on_child_added(snapshot, options)
            };
            outcomes.push(applied);
        }
        Ok(outcomes)
    }
}

/// Handlers only ever apply remote-origin mutations.
fn remote(options: ApplyOptions) -> ApplyOptions {
    ApplyOptions {
        origin: Origin::Remote,
        ..options
    }
}
