//! Compiled filters.
//!
//! A `FilterSpec` is the shape every read, delete and subscription is bound
//! to. The table layer produces them from caller criteria; stores evaluate
//! them.

use quire_common::types::{ChangeEvent, Record};
use serde_json::Value;

/// A compiled record filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    /// Every record.
    All,
    /// Records whose `field` equals one of `values`.
    ///
    /// Reads evaluate this per value, so a value listed twice yields its
    /// match twice.
    Membership {
        /// Field compared against, normally the identity field.
        field: String,
        /// Accepted values, in caller order.
        values: Vec<Value>,
    },
    /// Records where every listed field equals the given value.
    Equality(Record),
    /// Records carrying every listed field.
    HasFields(Vec<String>),
}

impl FilterSpec {
    /// Returns true if `record` passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterSpec::All => true,
            FilterSpec::Membership { field, values } => record
                .get(field)
                .is_some_and(|value| values.contains(value)),
            FilterSpec::Equality(fields) => fields
                .iter()
                .all(|(name, expected)| record.get(name) == Some(expected)),
            FilterSpec::HasFields(names) => names.iter().all(|name| record.contains_key(name)),
        }
    }

    /// Returns true if either image of `event` passes the filter.
    ///
    /// Matching the before-image keeps deletes and updates that move a record
    /// out of the filter visible; matching the after-image does the same for
    /// inserts and updates that move a record in.
    pub fn matches_change(&self, event: &ChangeEvent) -> bool {
        event.before.as_ref().is_some_and(|r| self.matches(r))
            || event.after.as_ref().is_some_and(|r| self.matches(r))
    }

    /// Returns true for the unfiltered scan.
    pub fn is_all(&self) -> bool {
        matches!(self, FilterSpec::All)
    }
}
