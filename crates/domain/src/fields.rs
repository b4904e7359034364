//! Record field extraction helpers shared by the entity mappings.

use chrono::{DateTime, Utc};

use tidings_core::{Identifier, Record, Value};
use tidings_store::StoreError;

fn missing(key: &str) -> StoreError {
    StoreError::Corrupt(format!("missing or mistyped field `{key}`"))
}

pub(crate) fn take_id(record: &mut Record, key: &str) -> Result<Identifier, StoreError> {
    record
        .remove(key)
        .and_then(|v| v.as_id())
        .ok_or_else(|| missing(key))
}

pub(crate) fn take_text(record: &mut Record, key: &str) -> Result<String, StoreError> {
    match record.remove(key) {
        Some(Value::Text(s)) => Ok(s),
        _ => Err(missing(key)),
    }
}

pub(crate) fn take_timestamp(record: &mut Record, key: &str) -> Result<DateTime<Utc>, StoreError> {
    record
        .remove(key)
        .and_then(|v| v.as_timestamp())
        .ok_or_else(|| missing(key))
}

pub(crate) fn opt_timestamp(record: &mut Record, key: &str) -> Option<DateTime<Utc>> {
    record.remove(key).and_then(|v| v.as_timestamp())
}

pub(crate) fn opt_text(record: &mut Record, key: &str) -> Option<String> {
    match record.remove(key) {
        Some(Value::Text(s)) => Some(s),
        _ => None,
    }
}

/// A (possibly absent) list of identifiers; non-identifier elements are a
/// corrupt document.
pub(crate) fn take_id_list(record: &mut Record, key: &str) -> Result<Vec<Identifier>, StoreError> {
    match record.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .into_iter()
            .map(|v| v.as_id().ok_or_else(|| missing(key)))
            .collect(),
        _ => Err(missing(key)),
    }
}
