//! Attribute-level diffing between the last-known remote state and the
//! local state of a record.
//!
//! The remote store merges partial updates field by field, so a local edit is
//! sent as the smallest mapping that turns the remote value into the local
//! one. Fields removed locally are sent as explicit deletions, which the
//! store encodes as `null`.

use crate::{Attributes, ID_FIELD};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single field change in a partial update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrite the field with a value
    Set(Value),
    /// Delete the field (sent as `null`)
    Delete,
}

impl FieldUpdate {
    /// The value sent over the wire.
    pub fn to_value(&self) -> Value {
        match self {
            FieldUpdate::Set(value) => value.clone(),
            FieldUpdate::Delete => Value::Null,
        }
    }
}

/// A partial update: field name to change, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, FieldUpdate>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), FieldUpdate::Set(value));
    }

    /// Delete a field.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.fields.insert(key.into(), FieldUpdate::Delete);
    }

    /// Look up the change for a field.
    pub fn get(&self, key: &str) -> Option<&FieldUpdate> {
        self.fields.get(key)
    }

    /// Whether the patch touches a field.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterate over changes in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldUpdate)> {
        self.fields.iter()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Apply the patch to a mapping, the way the remote store merges it.
    pub fn apply_to(&self, target: &mut Attributes) {
        for (key, update) in &self.fields {
            match update {
                FieldUpdate::Set(value) if !value.is_null() => {
                    target.insert(key.clone(), value.clone());
                }
                _ => {
                    target.remove(key);
                }
            }
        }
    }

    /// The JSON object sent to the remote store.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(key, update)| (key.clone(), update.to_value()))
                .collect(),
        )
    }
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, update) in &self.fields {
            map.serialize_entry(key, &update.to_value())?;
        }
        map.end()
    }
}

impl FromIterator<(String, FieldUpdate)> for Patch {
    fn from_iter<I: IntoIterator<Item = (String, FieldUpdate)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Compute the partial update that turns `remote` into `local`.
///
/// - keys only in `remote` (or `null` in `local`) become deletions
/// - keys in `local` whose value differs from `remote` are set
/// - unchanged keys and the identifier key are never emitted
pub fn diff(remote: &Attributes, local: &Attributes) -> Patch {
    let mut patch = Patch::new();

    for key in remote.keys() {
        if key == ID_FIELD {
            continue;
        }
        let present_locally = local.get(key).is_some_and(|value| !value.is_null());
        if !present_locally {
            patch.delete(key.clone());
        }
    }

    for (key, value) in local {
        if key == ID_FIELD || value.is_null() {
            continue;
        }
        if remote.get(key) != Some(value) {
            patch.set(key.clone(), value.clone());
        }
    }

    patch
}
