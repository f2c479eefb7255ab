//! Remote writes planned from local mutations.
//!
//! The engine never talks to the remote store itself. Every local mutation
//! yields at most one [`RemoteWrite`] per record, and the host executes them
//! in order against its store client.

use crate::{diff, guard, Attributes, Patch, Priority, Record, RecordId, ID_FIELD};
use serde::Serialize;
use serde_json::Value;

/// A write against one child of the remote location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteWrite {
    /// Replace the whole value
    Whole { id: RecordId, value: Value },
    /// Replace the whole value and set the ordering priority
    WithPriority {
        id: RecordId,
        value: Value,
        priority: Priority,
    },
    /// Merge fields into the stored value; deletions are `null`
    Partial { id: RecordId, patch: Patch },
    /// Delete the child
    Remove { id: RecordId },
}

impl RemoteWrite {
    /// The child the write targets.
    pub fn id(&self) -> &RecordId {
        match self {
            RemoteWrite::Whole { id, .. }
            | RemoteWrite::WithPriority { id, .. }
            | RemoteWrite::Partial { id, .. }
            | RemoteWrite::Remove { id } => id,
        }
    }

    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteWrite::Whole { .. } => "write_whole",
            RemoteWrite::WithPriority { .. } => "write_priority",
            RemoteWrite::Partial { .. } => "write_partial",
            RemoteWrite::Remove { .. } => "remove",
        }
    }

    /// Attribute mapping the remote store holds once this write lands.
    ///
    /// `None` for a removal.
    pub fn resulting_attributes(&self, previous: &Attributes) -> Option<Attributes> {
        match self {
            RemoteWrite::Whole { value, .. } | RemoteWrite::WithPriority { value, .. } => {
                let mut map = match value {
                    Value::Object(map) => map.clone(),
                    _ => Attributes::new(),
                };
                map.remove(ID_FIELD);
                Some(map)
            }
            RemoteWrite::Partial { patch, .. } => {
                let mut merged = previous.clone();
                patch.apply_to(&mut merged);
                Some(merged)
            }
            RemoteWrite::Remove { .. } => None,
        }
    }
}

/// Plan the write for a newly inserted record.
///
/// Uses the priority path when the record carries one. Nothing is planned
/// while the record is suppressed.
pub fn plan_create(record: &Record) -> Option<RemoteWrite> {
    if guard::is_suppressed(record) {
        return None;
    }
    Some(whole(record))
}

/// Plan the write for an in-place change of an existing record.
///
/// `last_remote` is the last-known remote attribute mapping. A record with a
/// priority is rewritten whole with it; otherwise the minimal partial update
/// is sent. An empty diff plans nothing.
pub fn plan_update(record: &Record, last_remote: &Attributes) -> Option<RemoteWrite> {
    if guard::is_suppressed(record) {
        return None;
    }
    if record.priority().is_some() {
        return Some(whole(record));
    }
    let patch = diff::diff(last_remote, record.attributes());
    if patch.is_empty() {
        return None;
    }
    Some(RemoteWrite::Partial {
        id: record.id.clone(),
        patch,
    })
}

/// Plan the removal of a record known locally.
pub fn plan_remove(record: &Record) -> Option<RemoteWrite> {
    if guard::is_suppressed(record) {
        return None;
    }
    Some(RemoteWrite::Remove {
        id: record.id.clone(),
    })
}

/// Plan the removal of a child that is not present locally.
pub fn plan_remove_id(id: impl Into<RecordId>) -> RemoteWrite {
    RemoteWrite::Remove { id: id.into() }
}

fn whole(record: &Record) -> RemoteWrite {
    match record.priority() {
        Some(priority) => RemoteWrite::WithPriority {
            id: record.id.clone(),
            value: record.payload(),
            priority: priority.clone(),
        },
        None => RemoteWrite::Whole {
            id: record.id.clone(),
            value: record.payload(),
        },
    }
}
