//! Records and identity values.
//!
//! A record is a JSON object with no schema beyond its identity field. The
//! identity field's name is chosen per connection; these helpers take it as
//! an argument rather than assuming `id`.

use serde_json::{Map, Value};

/// A schemaless document: field name to JSON value.
pub type Record = Map<String, Value>;

/// Returns the identity value of `record`, if it carries a non-null one.
///
/// # Example
///
/// ```rust
/// use quire_common::types::{identity_of, into_record};
/// use serde_json::json;
///
/// let record = into_record(json!({ "id": "abc", "a": 1 })).unwrap();
/// assert_eq!(identity_of(&record, "id"), Some(&json!("abc")));
///
/// let record = into_record(json!({ "id": null })).unwrap();
/// assert_eq!(identity_of(&record, "id"), None);
/// ```
#[inline]
#[must_use]
pub fn identity_of<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|value| !value.is_null())
}

/// Returns true if `value` can serve as an identity.
///
/// Identities are strings or numbers.
#[inline]
#[must_use]
pub fn is_identity(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_))
}

/// Converts a JSON value into a record if it is an object.
#[must_use]
pub fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
