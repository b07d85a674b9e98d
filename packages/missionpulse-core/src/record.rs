//! Records and change requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name to scalar value mapping.
pub type Fields = serde_json::Map<String, Value>;

/// Columns owned by the store; callers can never write them.
pub const STORE_MANAGED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Opaque record identifier assigned by the row store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an identifier out of a JSON value, accepting strings and numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A stored row: store-assigned id plus its fields.
///
/// Serializes flat, the way rows travel over the wire:
/// `{"id": "...", "title": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Builds a record from a flat JSON row.
    ///
    /// Returns `None` when the row is not an object or has no usable `id`.
    pub fn from_row(row: Value) -> Option<Self> {
        let Value::Object(mut fields) = row else {
            return None;
        };
        let id = fields.remove("id").as_ref().and_then(RecordId::from_value)?;
        Some(Self { id, fields })
    }

    /// Returns a field value, treating JSON null as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
}

/// Caller-supplied change to one table.
///
/// `id == None` creates a record; otherwise the listed fields are merged
/// into the existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    pub table: String,
    pub id: Option<RecordId>,
    pub fields: Fields,
}

impl ChangeRequest {
    /// Change request that inserts a new record.
    pub fn create(table: impl Into<String>, fields: Fields) -> Self {
        Self {
            table: table.into(),
            id: None,
            fields,
        }
    }

    /// Change request that merges `fields` into record `id`.
    pub fn update(table: impl Into<String>, id: RecordId, fields: Fields) -> Self {
        Self {
            table: table.into(),
            id: Some(id),
            fields,
        }
    }

    /// Returns true when this request creates a record.
    pub fn is_create(&self) -> bool {
        self.id.is_none()
    }
}

/// Compares two scalar values for filter equality.
///
/// Numbers compare numerically so `40` matches `40.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_round_trips_flat_row() {
        let record = Record::from_row(json!({"id": "abc", "title": "X", "pwin": 40})).unwrap();
        assert_eq!(record.id.as_str(), "abc");
        assert_eq!(record.fields.len(), 2);
        assert!(!record.fields.contains_key("id"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, json!({"id": "abc", "title": "X", "pwin": 40}));
    }

    #[test]
    fn test_record_from_row_accepts_numeric_id() {
        let record = Record::from_row(json!({"id": 17, "name": "n"})).unwrap();
        assert_eq!(record.id.as_str(), "17");
    }

    #[test]
    fn test_record_from_row_rejects_missing_id() {
        assert!(Record::from_row(json!({"title": "X"})).is_none());
        assert!(Record::from_row(json!({"id": ""})).is_none());
        assert!(Record::from_row(json!([1, 2])).is_none());
    }

    #[test]
    fn test_get_treats_null_as_absent() {
        let record = Record::from_row(json!({"id": "1", "pwin": null})).unwrap();
        assert!(record.get("pwin").is_none());
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_values_equal_is_numeric_aware() {
        assert!(values_equal(&json!(40), &json!(40.0)));
        assert!(!values_equal(&json!(40), &json!("40")));
        assert!(values_equal(&json!("qualify"), &json!("qualify")));
    }
}
