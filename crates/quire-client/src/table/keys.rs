//! Insert key reconciliation.
//!
//! A batch mixes records that carry their own identity with records that
//! leave it to the store. The store reports only the keys it generated, in
//! submission order; [`KeyPlan`] remembers which positions those belong to so
//! the caller gets one key per record, index for index.

use quire_common::types::{identity_of, Record};
use quire_common::{QuireError, QuireResult};
use serde_json::Value;

/// Per-position record of which keys were supplied by the caller.
#[derive(Debug)]
pub(crate) struct KeyPlan {
    explicit: Vec<Option<Value>>,
}

impl KeyPlan {
    /// Splits `records` into explicit and implicit positions.
    ///
    /// A `null` identity counts as absent and is stripped so the store
    /// generates one.
    pub(crate) fn prepare(records: &mut [Record], identity_field: &str) -> Self {
        let explicit = records
            .iter_mut()
            .map(|record| match identity_of(record, identity_field) {
                Some(key) => Some(key.clone()),
                None => {
                    record.remove(identity_field);
                    None
                }
            })
            .collect();
        Self { explicit }
    }

    /// Number of records the store must generate keys for.
    pub(crate) fn implicit(&self) -> usize {
        self.explicit.iter().filter(|key| key.is_none()).count()
    }

    /// Interleaves `generated` keys into the implicit positions.
    pub(crate) fn reconcile(self, generated: Vec<Value>) -> QuireResult<Vec<Value>> {
        let implicit = self.implicit();
        if generated.len() != implicit {
            return Err(QuireError::database(format!(
                "store generated {} keys for {} records without one",
                generated.len(),
                implicit
            )));
        }

        let mut generated = generated.into_iter();
        let keys = self
            .explicit
            .into_iter()
            .map(|key| key.or_else(|| generated.next()))
            .collect::<Option<Vec<_>>>();

        keys.ok_or_else(|| QuireError::database("generated keys exhausted"))
    }
}
