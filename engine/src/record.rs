//! Records: one id, a map of JSON attributes and an optional priority.

use crate::{
    error::Result, priority, Attributes, Error, Priority, RecordId, Snapshot, ID_FIELD,
    PRIORITY_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Made by the local caller
    Local,
    /// Applied from a remote change notification
    Remote,
}

/// A keyed record in the local collection.
///
/// The attribute mapping never holds the `id` key, the reserved `.priority`
/// key, or `null` values; a field set to `null` is unset instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier, fixed for the life of the record
    pub id: RecordId,
    /// Field values
    attributes: Attributes,
    /// Ordering value at the remote store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    /// Set while a remote-origin mutation is being applied
    #[serde(skip)]
    pub(crate) remote_changing: bool,
}

impl Record {
    /// Create a new record without priority.
    pub fn new(id: impl Into<RecordId>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes: normalize(attributes),
            priority: None,
            remote_changing: false,
        }
    }

    /// Build a record from caller-supplied attributes.
    ///
    /// The reserved `.priority` field is split out and the `id` field, if
    /// any, is dropped from the mapping.
    pub fn from_attributes(id: impl Into<RecordId>, attributes: Attributes) -> Result<Self> {
        let (priority, attributes) = priority::split(attributes)?;
        Ok(Self::new(id, attributes).with_priority(priority))
    }

    /// Build a record from a remote snapshot.
    ///
    /// Non-object values become empty records; the snapshot key always wins
    /// over any `id` stored inside the value.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::new(snapshot.key.clone(), snapshot.attributes())
            .with_priority(snapshot.priority.clone())
    }

    /// Set the priority (builder style).
    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    /// Field values, without `id` and `.priority`.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Ordering value, if any.
    pub fn priority(&self) -> Option<&Priority> {
        self.priority.as_ref()
    }

    /// Read a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Whether a field is present.
    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Set a field. Returns true if the stored value changed.
    ///
    /// `null` unsets the field; the `id` field is immutable and ignored.
    /// Setting `.priority` to a value that is neither a number, a string nor
    /// `null` is rejected and also returns false; use [`Priority::from_value`]
    /// first to tell that apart from an unchanged value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if key == ID_FIELD {
            return false;
        }
        if key == PRIORITY_FIELD {
            return match Priority::from_value(&value) {
                Ok(priority) => self.set_priority(priority),
                Err(_) => false,
            };
        }
        if value.is_null() {
            return self.unset(&key);
        }
        match self.attributes.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.attributes.insert(key, value);
                true
            }
        }
    }

    /// Remove a field. Returns true if it was present.
    pub fn unset(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    /// Change the priority. Returns true if it changed.
    pub fn set_priority(&mut self, priority: Option<Priority>) -> bool {
        if self.priority == priority {
            return false;
        }
        self.priority = priority;
        true
    }

    /// Replace all attributes with `attributes`.
    ///
    /// Returns the names of the fields that changed, sorted. A `.priority`
    /// key in the input updates the priority; otherwise the priority is kept.
    pub fn replace(&mut self, attributes: Attributes) -> Result<Vec<String>> {
        let explicit_priority = priority::has_priority(&attributes);
        let (new_priority, attributes) = priority::split(attributes)?;
        let attributes = normalize(attributes);

        let mut changed: Vec<String> = self
            .attributes
            .keys()
            .filter(|key| !attributes.contains_key(*key))
            .cloned()
            .collect();
        for (key, value) in &attributes {
            if self.attributes.get(key) != Some(value) {
                changed.push(key.clone());
            }
        }
        self.attributes = attributes;

        if explicit_priority && self.set_priority(new_priority) {
            changed.push(PRIORITY_FIELD.to_string());
        }

        changed.sort();
        Ok(changed)
    }

    /// The value written to the remote store: attributes plus `id`.
    ///
    /// Never contains the reserved priority field.
    pub fn payload(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }

    /// JSON view for callers: attributes, `id` and `.priority` when set.
    pub fn to_json(&self) -> Value {
        let mut value = self.payload();
        if let (Some(priority), Value::Object(map)) = (&self.priority, &mut value) {
            map.insert(PRIORITY_FIELD.to_string(), priority.to_value());
        }
        value
    }
}

/// Extract a record id from caller attributes, if one is present.
///
/// Strings are taken as-is and numbers are rendered in decimal. Empty
/// strings, nulls and other kinds are rejected.
pub fn id_from_attributes(attributes: &Attributes) -> Result<Option<RecordId>> {
    match attributes.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(Error::InvalidId(other.to_string())),
    }
}

/// Convert a JSON value into an attribute mapping.
pub fn attributes_from_value(value: Value) -> Result<Attributes> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Attributes::new()),
        other => Err(Error::InvalidAttributes(format!(
            "expected object, got {}",
            other
        ))),
    }
}

fn normalize(mut attributes: Attributes) -> Attributes {
    attributes.remove(ID_FIELD);
    attributes.remove(PRIORITY_FIELD);
    attributes.retain(|_, value| !value.is_null());
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        attributes_from_value(value).unwrap()
    }

    #[test]
    fn create_record() {
        let record = Record::new("todo-1", attrs(json!({"id": "x", "title": "Milk", "done": null})));

        assert_eq!(record.id, "todo-1");
        assert_eq!(record.attributes(), &attrs(json!({"title": "Milk"})));
        assert!(record.priority().is_none());
    }

    #[test]
    fn from_attributes_splits_priority() {
        let record =
            Record::from_attributes("a", attrs(json!({".priority": 4, "title": "x"}))).unwrap();

        assert_eq!(record.priority(), Some(&Priority::Number(4.0)));
        assert!(!record.has(PRIORITY_FIELD));
        assert_eq!(record.payload(), json!({"id": "a", "title": "x"}));
        assert_eq!(
            record.to_json(),
            json!({"id": "a", "title": "x", ".priority": 4.0})
        );
    }

    #[test]
    fn set_rejects_invalid_priority() {
        let mut record =
            Record::new("a", Attributes::new()).with_priority(Some(Priority::from(2i64)));

        assert!(!record.set(PRIORITY_FIELD, json!(true)));
        assert_eq!(record.priority(), Some(&Priority::from(2i64)));
        assert!(!record.has(PRIORITY_FIELD));
        assert!(Priority::from_value(&json!(true)).is_err());

        assert!(record.set(PRIORITY_FIELD, json!("b")));
        assert_eq!(record.priority(), Some(&Priority::from("b")));
    }

    #[test]
    fn set_and_unset() {
        let mut record = Record::new("a", attrs(json!({"name": "David"})));

        assert!(!record.set("name", json!("David")));
        assert!(record.set("name", json!("Kato")));
        assert!(record.set("age", json!(26)));
        assert!(record.set("age", Value::Null));
        assert!(!record.has("age"));
        assert!(!record.unset("age"));
        assert!(!record.set("id", json!("b")));
        assert_eq!(record.id, "a");
    }

    #[test]
    fn set_priority_through_reserved_key() {
        let mut record = Record::new("a", Attributes::new());
        assert!(record.set(".priority", json!(2)));
        assert_eq!(record.priority(), Some(&Priority::Number(2.0)));
        assert!(record.attributes().is_empty());
        assert!(record.set(".priority", Value::Null));
        assert!(record.priority().is_none());
    }

    #[test]
    fn replace_reports_changed_fields() {
        let mut record = Record::new("a", attrs(json!({"name": "David", "age": 26})))
            .with_priority(Some(Priority::from(1i64)));

        let changed = record
            .replace(attrs(json!({"name": "Kato", "city": "Oslo"})))
            .unwrap();

        assert_eq!(changed, vec!["age", "city", "name"]);
        assert_eq!(record.attributes(), &attrs(json!({"name": "Kato", "city": "Oslo"})));
        // priority kept when not mentioned
        assert_eq!(record.priority(), Some(&Priority::Number(1.0)));

        let changed = record
            .replace(attrs(json!({"name": "Kato", "city": "Oslo", ".priority": null})))
            .unwrap();
        assert_eq!(changed, vec![".priority"]);
        assert!(record.priority().is_none());
    }

    #[test]
    fn id_extraction() {
        assert_eq!(
            id_from_attributes(&attrs(json!({"id": "u1"}))).unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(
            id_from_attributes(&attrs(json!({"id": 7}))).unwrap(),
            Some("7".to_string())
        );
        assert_eq!(id_from_attributes(&attrs(json!({"name": "x"}))).unwrap(), None);
        assert!(matches!(
            id_from_attributes(&attrs(json!({"id": ""}))),
            Err(Error::InvalidId(_))
        ));
        assert!(matches!(
            id_from_attributes(&attrs(json!({"id": [1]}))),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn attributes_from_non_object() {
        assert!(matches!(
            attributes_from_value(json!([1, 2])),
            Err(Error::InvalidAttributes(_))
        ));
        assert!(attributes_from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut record = Record::from_attributes(
            "user-1",
            attrs(json!({"name": "Alice", "age": 30, ".priority": "b"})),
        )
        .unwrap();
        record.remote_changing = true;

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("remoteChanging"));

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.attributes(), record.attributes());
        assert_eq!(parsed.priority(), record.priority());
        assert!(!parsed.remote_changing);
    }
}
