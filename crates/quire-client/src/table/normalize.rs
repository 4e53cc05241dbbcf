//! Caller-facing result shapes.

use quire_common::types::Record;
use quire_common::{QuireError, QuireResult};

/// `None` for an empty result, otherwise every row.
pub(crate) fn rows(records: Vec<Record>) -> Option<Vec<Record>> {
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

/// The first row, if any.
pub(crate) fn first(records: Vec<Record>) -> Option<Record> {
    records.into_iter().next()
}

/// `None` for zero rows, the row for one, an error for more.
pub(crate) fn single(records: Vec<Record>) -> QuireResult<Option<Record>> {
    match records.len() {
        0 | 1 => Ok(first(records)),
        count => Err(QuireError::MultipleResults { count }),
    }
}
