//! Record selection criteria.
//!
//! Every read, delete and change feed is driven by a [`Criteria`], compiled
//! against the connection's identity field into the [`FilterSpec`] the
//! driver evaluates.

use quire_common::types::{is_identity, Record};
use quire_common::{QuireError, QuireResult, WILDCARD};
use quire_driver::FilterSpec;
use serde_json::Value;

/// Which records an operation addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// The record with this identity.
    Identity(Value),
    /// Every record whose identity is listed. A value listed twice yields
    /// its record twice.
    IdentitySet(Vec<Value>),
    /// Records where every given field equals the given value.
    Predicate(Record),
    /// Records carrying every named field.
    HasFields(Vec<String>),
    /// Every record in the table.
    Wildcard,
}

impl Criteria {
    /// Parses a dynamic criteria value.
    ///
    /// `"*"` selects everything, strings and numbers are identities, arrays
    /// are identity sets and objects are predicates.
    ///
    /// # Example
    ///
    /// ```rust
    /// use quire_client::Criteria;
    /// use serde_json::json;
    ///
    /// assert_eq!(Criteria::parse(json!("*")).unwrap(), Criteria::Wildcard);
    /// assert_eq!(Criteria::parse(json!(3)).unwrap(), Criteria::Identity(json!(3)));
    /// assert!(Criteria::parse(json!(null)).is_err());
    /// ```
    pub fn parse(value: Value) -> QuireResult<Self> {
        match value {
            Value::String(s) if s == WILDCARD => Ok(Criteria::Wildcard),
            value @ (Value::String(_) | Value::Number(_)) => Ok(Criteria::Identity(value)),
            Value::Array(values) => Ok(Criteria::IdentitySet(values)),
            Value::Object(fields) => Ok(Criteria::Predicate(fields)),
            other => Err(QuireError::invalid_criteria(format!(
                "unsupported criteria value {}",
                other
            ))),
        }
    }

    /// Selects records carrying every named field.
    pub fn has_fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Criteria::HasFields(names.into_iter().map(Into::into).collect())
    }

    /// Compiles into a filter against `identity_field`.
    ///
    /// Fails before any I/O if an identity is not a string or number, or if
    /// no field names are given.
    pub fn compile(&self, identity_field: &str) -> QuireResult<FilterSpec> {
        match self {
            Criteria::Identity(value) => {
                check_identity(value)?;
                Ok(FilterSpec::Membership {
                    field: identity_field.to_string(),
                    values: vec![value.clone()],
                })
            }
            Criteria::IdentitySet(values) => {
                values.iter().try_for_each(check_identity)?;
                Ok(FilterSpec::Membership {
                    field: identity_field.to_string(),
                    values: values.clone(),
                })
            }
            Criteria::Predicate(fields) => Ok(FilterSpec::Equality(fields.clone())),
            Criteria::HasFields(names) if names.is_empty() => Err(
                QuireError::invalid_criteria("field selection names no fields"),
            ),
            Criteria::HasFields(names) => Ok(FilterSpec::HasFields(names.clone())),
            Criteria::Wildcard => Ok(FilterSpec::All),
        }
    }

    /// Returns the identity for single-identity criteria.
    pub fn identity(&self) -> Option<&Value> {
        match self {
            Criteria::Identity(value) => Some(value),
            _ => None,
        }
    }
}

fn check_identity(value: &Value) -> QuireResult<()> {
    if is_identity(value) {
        Ok(())
    } else {
        Err(QuireError::invalid_criteria(format!(
            "identity must be a string or number, got {}",
            value
        )))
    }
}

impl TryFrom<Value> for Criteria {
    type Error = QuireError;

    fn try_from(value: Value) -> QuireResult<Self> {
        Criteria::parse(value)
    }
}

macro_rules! identity_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Criteria {
                fn from(value: $ty) -> Self {
                    Criteria::Identity(Value::from(value))
                }
            }
        )*
    };
}

identity_from!(i32, i64, u32, u64, &str, String);

impl<T: Into<Value>> From<Vec<T>> for Criteria {
    fn from(values: Vec<T>) -> Self {
        Criteria::IdentitySet(values.into_iter().map(Into::into).collect())
    }
}

impl From<Record> for Criteria {
    fn from(fields: Record) -> Self {
        Criteria::Predicate(fields)
    }
}
