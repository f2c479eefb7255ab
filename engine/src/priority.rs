//! Record priorities and the splitter that lifts them out of attributes.
//!
//! The remote store orders children by an optional priority. Callers may pass
//! it inline as the reserved `.priority` attribute; [`split`] removes it from
//! the mapping so it is never replicated as ordinary data.

use crate::{error::Result, Attributes, Error, PRIORITY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Ordering value attached to a record at the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    Number(f64),
    Text(String),
}

impl Priority {
    /// Interpret a JSON value as a priority.
    ///
    /// `null` means "no priority". Anything other than a number or string is
    /// rejected.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(|n| Some(Priority::Number(n)))
                .ok_or_else(|| Error::InvalidPriority(n.to_string())),
            Value::String(s) => Ok(Some(Priority::Text(s.clone()))),
            other => Err(Error::InvalidPriority(other.to_string())),
        }
    }

    /// Convert back to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Priority::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Priority::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Priority::Number(value)
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Priority::Number(value as f64)
    }
}

impl From<&str> for Priority {
    fn from(value: &str) -> Self {
        Priority::Text(value.to_string())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Number(n) => write!(f, "{}", n),
            Priority::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Compare two optional priorities the way the remote store orders children.
///
/// No priority sorts first, then numbers ascending, then strings
/// lexicographically.
pub fn compare(a: Option<&Priority>, b: Option<&Priority>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Priority::Number(x)), Some(Priority::Number(y))) => x.total_cmp(y),
        (Some(Priority::Number(_)), Some(Priority::Text(_))) => Ordering::Less,
        (Some(Priority::Text(_)), Some(Priority::Number(_))) => Ordering::Greater,
        (Some(Priority::Text(x)), Some(Priority::Text(y))) => x.cmp(y),
    }
}

/// Split the reserved priority field out of an attribute mapping.
///
/// Returns `Ok((None, attributes))` unchanged when the field is absent.
/// When present, the field is removed from the returned mapping and its value
/// is returned separately (`None` if it was `null`).
pub fn split(mut attributes: Attributes) -> Result<(Option<Priority>, Attributes)> {
    match attributes.remove(PRIORITY_FIELD) {
        Some(value) => Ok((Priority::from_value(&value)?, attributes)),
        None => Ok((None, attributes)),
    }
}

/// Whether the reserved priority field is present in a mapping.
pub fn has_priority(attributes: &Attributes) -> bool {
    attributes.contains_key(PRIORITY_FIELD)
}
