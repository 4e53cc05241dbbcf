//! Change events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{identity_of, Record};

/// Kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A record appeared (`before` absent).
    Insert,
    /// A record was modified (both images present).
    Update,
    /// A record disappeared (`after` absent).
    Delete,
}

/// A before/after snapshot pair emitted by a change feed.
///
/// Serializes as `{ "before": ..., "after": ... }` with `null` for an absent
/// image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The record before the change, absent for inserts.
    pub before: Option<Record>,
    /// The record after the change, absent for deletes.
    pub after: Option<Record>,
}

impl ChangeEvent {
    /// Creates an insert event.
    pub fn insert(after: Record) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    /// Creates an update event.
    pub fn update(before: Record, after: Record) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    /// Creates a delete event.
    pub fn delete(before: Record) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }

    /// Returns the kind of change.
    ///
    /// An event with neither image is reported as an update; stores never
    /// emit one.
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, Some(_)) => ChangeKind::Insert,
            (Some(_), None) => ChangeKind::Delete,
            _ => ChangeKind::Update,
        }
    }

    /// Returns the identity of the changed record, preferring the
    /// after-image.
    pub fn identity<'a>(&'a self, field: &str) -> Option<&'a Value> {
        self.after
            .as_ref()
            .and_then(|r| identity_of(r, field))
            .or_else(|| self.before.as_ref().and_then(|r| identity_of(r, field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::into_record;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        into_record(value).unwrap()
    }

    #[test]
    fn test_change_kind() {
        let a = rec(json!({ "id": 1, "a": 1 }));
        let b = rec(json!({ "id": 1, "a": 2 }));

        assert_eq!(ChangeEvent::insert(a.clone()).kind(), ChangeKind::Insert);
        assert_eq!(ChangeEvent::update(a.clone(), b).kind(), ChangeKind::Update);
        assert_eq!(ChangeEvent::delete(a).kind(), ChangeKind::Delete);
    }

    #[test]
    fn test_identity_falls_back_to_before() {
        let event = ChangeEvent::delete(rec(json!({ "id": 9 })));
        assert_eq!(event.identity("id"), Some(&json!(9)));
    }

    #[test]
    fn test_serialized_shape() {
        let event = ChangeEvent::delete(rec(json!({ "id": 1 })));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "before": { "id": 1 }, "after": null }));
    }
}
