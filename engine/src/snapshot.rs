//! Remote snapshots and the child events that carry them.
//!
//! A snapshot is the read-only view of one child of the remote location at
//! the moment a change notification was emitted.

use crate::{record, Attributes, Priority, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable view of a remote child: key, value and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Child key, used as the record id
    pub key: RecordId,
    /// Stored value (usually an object)
    pub value: Value,
    /// Ordering value at the remote store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl Snapshot {
    /// Create a snapshot without priority.
    pub fn new(key: impl Into<RecordId>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            priority: None,
        }
    }

    /// Create a snapshot with priority.
    pub fn with_priority(key: impl Into<RecordId>, value: Value, priority: Priority) -> Self {
        Self {
            key: key.into(),
            value,
            priority: Some(priority),
        }
    }

    /// The value as an attribute mapping.
    ///
    /// Non-object values yield an empty mapping. The `id` key is kept here and
    /// dropped when the mapping becomes a record.
    pub fn attributes(&self) -> Attributes {
        match &self.value {
            Value::Object(map) => map.clone(),
            _ => Attributes::new(),
        }
    }

    /// Whether the value is absent (the child no longer exists).
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Snapshot attributes as they would be stored on a record.
    pub(crate) fn record_attributes(&self) -> Attributes {
        record::Record::new(self.key.clone(), self.attributes())
            .attributes()
            .clone()
    }
}

/// A child notification from the remote location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "snapshot", rename_all = "snake_case")]
pub enum ChildEvent {
    Added(Snapshot),
    Changed(Snapshot),
    Removed(Snapshot),
    Moved(Snapshot),
}

impl ChildEvent {
    /// The snapshot carried by the event.
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            ChildEvent::Added(s)
            | ChildEvent::Changed(s)
            | ChildEvent::Removed(s)
            | ChildEvent::Moved(s) => s,
        }
    }

    /// The key of the child the event is about.
    pub fn key(&self) -> &RecordId {
        &self.snapshot().key
    }

    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ChildEvent::Added(_) => "child_added",
            ChildEvent::Changed(_) => "child_changed",
            ChildEvent::Removed(_) => "child_removed",
            ChildEvent::Moved(_) => "child_moved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_of_object() {
        let snap = Snapshot::new("1", json!({"id": 1, "name": "David"}));
        assert_eq!(snap.attributes().len(), 2);
        assert_eq!(snap.record_attributes().len(), 1);
        assert!(snap.exists());
    }

    #[test]
    fn attributes_of_scalar_are_empty() {
        let snap = Snapshot::new("1", json!("just a string"));
        assert!(snap.attributes().is_empty());

        let gone = Snapshot::new("1", Value::Null);
        assert!(!gone.exists());
    }

    #[test]
    fn event_accessors() {
        let event = ChildEvent::Moved(Snapshot::with_priority(
            "k",
            json!({}),
            Priority::from(2i64),
        ));
        assert_eq!(event.key(), "k");
        assert_eq!(event.kind(), "child_moved");
        assert_eq!(event.snapshot().priority, Some(Priority::Number(2.0)));
    }

    #[test]
    fn event_serialization() {
        let event = ChildEvent::Added(Snapshot::new("a", json!({"title": "x"})));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"type": "added", "snapshot": {"key": "a", "value": {"title": "x"}}})
        );

        let parsed: ChildEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }
}
