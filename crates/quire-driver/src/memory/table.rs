//! Per-table storage for the in-memory store.
//!
//! Rows are kept in a `BTreeMap` keyed by the canonical JSON encoding of
//! their primary key. Every write publishes its change events while still
//! holding the row lock, so subscribers observe commit order.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use quire_common::types::{identity_of, is_identity, ChangeEvent, Record};
use serde_json::{Number, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::driver::{Mutation, WriteAck};
use crate::error::{DriverError, DriverResult};
use crate::filter::FilterSpec;

/// A single table of the in-memory store.
#[derive(Debug)]
pub(crate) struct MemoryTable {
    /// Table name.
    name: String,
    /// Primary key field.
    primary_key: String,
    /// Rows by encoded primary key.
    rows: RwLock<BTreeMap<String, Record>>,
    /// Change fan-out.
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryTable {
    /// Creates an empty table.
    pub(crate) fn new(name: &str, primary_key: &str, feed_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(feed_capacity);
        Self {
            name: name.to_string(),
            primary_key: primary_key.to_string(),
            rows: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// Returns the primary key field.
    pub(crate) fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns the number of rows.
    pub(crate) fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Registers a new change receiver.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a batch atomically.
    ///
    /// The whole batch is validated before any row is written, so a rejected
    /// batch leaves the table untouched.
    pub(crate) fn insert(&self, records: Vec<Record>) -> DriverResult<WriteAck> {
        let mut rows = self.rows.write();

        let mut prepared = Vec::with_capacity(records.len());
        let mut generated_keys = Vec::new();
        let mut seen = HashSet::with_capacity(records.len());

        for mut record in records {
            let key = match identity_of(&record, &self.primary_key) {
                Some(key) => key.clone(),
                None => {
                    let key = Value::String(Uuid::new_v4().to_string());
                    record.insert(self.primary_key.clone(), key.clone());
                    generated_keys.push(key.clone());
                    key
                }
            };

            let encoded = row_key(&key)?;
            if rows.contains_key(&encoded) || !seen.insert(encoded.clone()) {
                return Err(DriverError::DuplicateKey {
                    table: self.name.clone(),
                    key,
                });
            }
            prepared.push((encoded, record));
        }

        let inserted = prepared.len() as u64;
        for (encoded, record) in prepared {
            self.publish(ChangeEvent::insert(record.clone()));
            rows.insert(encoded, record);
        }

        Ok(WriteAck {
            inserted,
            generated_keys,
            ..Default::default()
        })
    }

    /// Applies a mutation to one record.
    pub(crate) fn modify(&self, key: &Value, mutation: &Mutation) -> DriverResult<WriteAck> {
        let encoded = row_key(key)?;
        let mut rows = self.rows.write();

        let before = match rows.get(&encoded) {
            Some(record) => record.clone(),
            None => {
                return Ok(WriteAck {
                    skipped: 1,
                    ..Default::default()
                })
            }
        };

        let mut after = before.clone();
        apply_mutation(&mut after, mutation, &self.primary_key)?;

        if after == before {
            return Ok(WriteAck {
                unchanged: 1,
                ..Default::default()
            });
        }

        rows.insert(encoded, after.clone());
        self.publish(ChangeEvent::update(before, after));

        Ok(WriteAck {
            replaced: 1,
            ..Default::default()
        })
    }

    /// Deletes every record passing `filter`.
    pub(crate) fn delete(&self, filter: &FilterSpec) -> WriteAck {
        let mut rows = self.rows.write();

        let doomed: Vec<String> = match filter {
            FilterSpec::Membership { field, values } if *field == self.primary_key => values
                .iter()
                .filter_map(|value| row_key(value).ok())
                .collect(),
            _ => rows
                .iter()
                .filter(|(_, record)| filter.matches(record))
                .map(|(key, _)| key.clone())
                .collect(),
        };

        let mut deleted = 0;
        for key in doomed {
            // Repeated keys in a membership list find nothing the second time.
            if let Some(record) = rows.remove(&key) {
                deleted += 1;
                self.publish(ChangeEvent::delete(record));
            }
        }

        WriteAck {
            deleted,
            ..Default::default()
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns copies of the records passing `filter`.
    ///
    /// Membership filters are evaluated per listed value, in list order.
    pub(crate) fn read(&self, filter: &FilterSpec) -> Vec<Record> {
        let rows = self.rows.read();

        match filter {
            FilterSpec::Membership { field, values } if *field == self.primary_key => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    if let Some(record) = row_key(value).ok().and_then(|key| rows.get(&key)) {
                        out.push(record.clone());
                    }
                }
                out
            }
            FilterSpec::Membership { field, values } => {
                let mut out = Vec::new();
                for value in values {
                    for record in rows.values() {
                        if record.get(field) == Some(value) {
                            out.push(record.clone());
                        }
                    }
                }
                out
            }
            _ => rows
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error.
        let _ = self.changes.send(event);
    }
}

/// Encodes a primary key into its row map key.
fn row_key(key: &Value) -> DriverResult<String> {
    if !is_identity(key) {
        return Err(DriverError::InvalidRecord(format!(
            "primary key must be a string or number, got {}",
            key
        )));
    }
    serde_json::to_string(key).map_err(|e| DriverError::Internal(e.to_string()))
}

/// Applies `mutation` to `record` in place.
fn apply_mutation(record: &mut Record, mutation: &Mutation, primary_key: &str) -> DriverResult<()> {
    match mutation {
        Mutation::Merge(patch) => {
            if let Some(new_key) = patch.get(primary_key) {
                if record.get(primary_key) != Some(new_key) {
                    return Err(DriverError::ImmutableKey {
                        field: primary_key.to_string(),
                    });
                }
            }
            merge(record, patch);
        }
        Mutation::Increment { field, amount } => {
            let sum = match record.get(field) {
                Some(Value::Number(current)) => add(field, current, amount)?,
                Some(_) => {
                    return Err(DriverError::FieldType {
                        field: field.clone(),
                        reason: "is not a number".to_string(),
                    })
                }
                None => {
                    return Err(DriverError::FieldType {
                        field: field.clone(),
                        reason: "is missing".to_string(),
                    })
                }
            };
            record.insert(field.clone(), Value::Number(sum));
        }
        Mutation::Append { field, value } => match record.get_mut(field) {
            Some(Value::Array(items)) => items.push(value.clone()),
            Some(_) => {
                return Err(DriverError::FieldType {
                    field: field.clone(),
                    reason: "is not a list".to_string(),
                })
            }
            None => {
                record.insert(field.clone(), Value::Array(vec![value.clone()]));
            }
        },
        Mutation::Unset { field } => {
            if field == primary_key {
                return Err(DriverError::ImmutableKey {
                    field: primary_key.to_string(),
                });
            }
            record.remove(field);
        }
    }
    Ok(())
}

/// Recursively merges `patch` into `target`.
fn merge(target: &mut Record, patch: &Record) {
    for (name, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (target.get_mut(name), value)
        {
            merge(existing, incoming);
            continue;
        }
        target.insert(name.clone(), value.clone());
    }
}

/// Adds two JSON numbers, staying integral when both sides are.
fn add(field: &str, current: &Number, amount: &Number) -> DriverResult<Number> {
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }

    let a = current.as_f64().unwrap_or_default();
    let b = amount.as_f64().unwrap_or_default();
    Number::from_f64(a + b).ok_or_else(|| DriverError::FieldType {
        field: field.to_string(),
        reason: "overflowed".to_string(),
    })
}
