//! Type-preserving document mapper.
//!
//! Serialization flattens nested records into dotted paths and emits an
//! inline type tag (`__t.<path>`) for every leaf the store cannot represent
//! natively: identifiers (tag 0) travel as raw bytes, arbitrary-precision
//! decimals (tag 1) as the store's decimal type keyed to their canonical
//! string. Deserialization accepts both the inline tag layout and the legacy
//! sibling `__t` sub-document, reconstructs tagged paths, unflattens, strips
//! bookkeeping fields and renames the primary key back to `id`.
//!
//! Decimals round-trip string-exactly: `serialize(deserialize(x)) == x`
//! bit-for-bit on the canonical string form, never through a binary float.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;

use tidings_core::{Identifier, Record, Value};

use crate::document::{
    Document, StoreValue, ID_FIELD, PRIMARY_KEY, TAG_DECIMAL, TAG_FIELD, TAG_ID, TAG_PREFIX,
    VERSION_FIELD,
};
use crate::error::StoreError;

/// Recursively flatten a record into dotted-path leaves.
///
/// Nested records merge under `parent.child`; lists, identifiers, decimals,
/// timestamps and binary values are leaves and are not descended into.
pub fn flatten(record: &Record) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    flatten_into(record, None, &mut flat);
    flat
}

fn flatten_into(record: &Record, parent: Option<&str>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in record {
        let path = match parent {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Record(inner) => flatten_into(inner, Some(&path), out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

/// Convert one leaf to its store form, with the tag code it needs (if any).
fn store_value(value: &Value) -> Result<(StoreValue, Option<i64>), StoreError> {
    Ok(match value {
        Value::Null => (StoreValue::Null, None),
        Value::Bool(b) => (StoreValue::Bool(*b), None),
        Value::Int(n) => (StoreValue::Int(*n), None),
        Value::Float(f) => (StoreValue::Float(*f), None),
        Value::Text(s) => (StoreValue::Text(s.clone()), None),
        Value::Timestamp(ts) => (StoreValue::DateTime(*ts), None),
        Value::Binary(b) => (StoreValue::Binary(b.clone()), None),
        Value::Id(id) => (StoreValue::Binary(id.as_bytes().to_vec()), Some(TAG_ID)),
        Value::Decimal(d) => (StoreValue::Decimal128(d.to_string()), Some(TAG_DECIMAL)),
        Value::List(items) => (serialize_list(items)?, None),
        Value::Record(inner) => (StoreValue::Doc(serialize(inner)?), None),
    })
}

/// Arrays are serialized element-wise. Elements that are themselves records
/// become nested documents carrying their own inline tags; identifier and
/// decimal elements are written untagged (reconstruction inside arrays is
/// shape-driven on read).
fn serialize_list(items: &[Value]) -> Result<StoreValue, StoreError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let (sv, _tag) = store_value(item)?;
        out.push(sv);
    }
    Ok(StoreValue::Array(out))
}

/// Serialize a record into a flat tagged document.
///
/// The field conventionally named `id` moves to the store's primary-key path
/// and is always tagged as an identifier.
pub fn serialize(record: &Record) -> Result<Document, StoreError> {
    let mut doc = Document::new();
    for (key, value) in flatten(record) {
        let path = if key == ID_FIELD {
            PRIMARY_KEY.to_owned()
        } else {
            key
        };
        let (sv, tag) = store_value(&value)?;
        if let Some(code) = tag {
            doc.insert(format!("{TAG_PREFIX}{path}"), StoreValue::Int(code));
        }
        doc.insert(path, sv);
    }
    Ok(doc)
}

/// Reconstruct a record from a stored document.
pub fn deserialize(doc: &Document) -> Result<Record, StoreError> {
    let tags = tag_table(doc)?;

    let mut flat: BTreeMap<String, Value> = BTreeMap::new();
    for (key, sv) in doc {
        if key == TAG_FIELD || key.starts_with(TAG_PREFIX) || key == VERSION_FIELD {
            continue;
        }
        flat.insert(key.clone(), domain_value(sv)?);
    }

    // A tag whose path carries no value is dropped.
    for (path, code) in tags {
        let Some(existing) = flat.get(&path) else {
            continue;
        };
        let rebuilt = match code {
            TAG_ID => retag_identifier(&path, existing)?,
            TAG_DECIMAL => retag_decimal(&path, existing)?,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "unknown type tag {other} at `{path}`"
                )));
            }
        };
        flat.insert(path, rebuilt);
    }

    if let Some(id) = flat.remove(PRIMARY_KEY) {
        flat.insert(ID_FIELD.to_owned(), id);
    }

    unflatten(flat)
}

fn retag_identifier(path: &str, value: &Value) -> Result<Value, StoreError> {
    match value {
        Value::Binary(bytes) => Ok(Value::Id(Identifier::from_bytes(bytes)?)),
        Value::Id(id) => Ok(Value::Id(*id)),
        other => Err(StoreError::Corrupt(format!(
            "tagged identifier at `{path}` is not binary: {other:?}"
        ))),
    }
}

fn retag_decimal(path: &str, value: &Value) -> Result<Value, StoreError> {
    match value {
        Value::Decimal(d) => Ok(Value::Decimal(d.clone())),
        Value::Text(s) => {
            let d: BigDecimal = s
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("bad decimal at `{path}`: {s}")))?;
            Ok(Value::Decimal(d))
        }
        other => Err(StoreError::Corrupt(format!(
            "tagged decimal at `{path}` is not decimal-shaped: {other:?}"
        ))),
    }
}

/// Default (untagged) store-to-domain conversion for one value.
fn domain_value(sv: &StoreValue) -> Result<Value, StoreError> {
    Ok(match sv {
        StoreValue::Null => Value::Null,
        StoreValue::Bool(b) => Value::Bool(*b),
        StoreValue::Int(n) => Value::Int(*n),
        StoreValue::Float(f) => Value::Float(*f),
        StoreValue::Text(s) => Value::Text(s.clone()),
        StoreValue::DateTime(ts) => Value::Timestamp(*ts),
        StoreValue::Binary(b) => Value::Binary(b.clone()),
        StoreValue::Decimal128(s) => {
            let d: BigDecimal = s
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("bad stored decimal: {s}")))?;
            Value::Decimal(d)
        }
        StoreValue::Array(items) => Value::List(deserialize_list(items)?),
        StoreValue::Doc(inner) => Value::Record(deserialize(inner)?),
    })
}

/// Array elements carry no tags on disk; reconstruction is shape-driven.
/// A bare binary element is an identifier, a nested document is a record
/// with its own inline tags.
fn deserialize_list(items: &[StoreValue]) -> Result<Vec<Value>, StoreError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(match item {
            StoreValue::Binary(bytes) => Value::Id(Identifier::from_bytes(bytes)?),
            StoreValue::Array(inner) => Value::List(deserialize_list(inner)?),
            other => domain_value(other)?,
        });
    }
    Ok(out)
}

/// Normalize both on-disk tag layouts into one `path -> code` table.
///
/// The inline layout stores `__t.<path>` marker fields beside the data; the
/// legacy layout stores a sibling `__t` sub-document mirroring the record's
/// nesting. Both are accepted on read; only the inline form is written.
fn tag_table(doc: &Document) -> Result<BTreeMap<String, i64>, StoreError> {
    let mut tags = BTreeMap::new();

    for (key, sv) in doc {
        if let Some(path) = key.strip_prefix(TAG_PREFIX) {
            match sv {
                StoreValue::Int(code) => {
                    tags.insert(path.to_owned(), *code);
                }
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "tag marker `{key}` is not an integer: {other:?}"
                    )));
                }
            }
        }
    }

    if let Some(StoreValue::Doc(legacy)) = doc.get(TAG_FIELD) {
        collect_legacy_tags(legacy, None, &mut tags)?;
    }

    Ok(tags)
}

fn collect_legacy_tags(
    doc: &Document,
    parent: Option<&str>,
    out: &mut BTreeMap<String, i64>,
) -> Result<(), StoreError> {
    for (key, sv) in doc {
        let path = match parent {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match sv {
            StoreValue::Int(code) => {
                out.insert(path, *code);
            }
            StoreValue::Doc(inner) => collect_legacy_tags(inner, Some(&path), out)?,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "legacy tag entry `{path}` is not an integer: {other:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Rebuild nesting from dotted paths.
fn unflatten(flat: BTreeMap<String, Value>) -> Result<Record, StoreError> {
    let mut root = Record::new();
    for (path, value) in flat {
        let parts: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &parts, value, &path)?;
    }
    Ok(root)
}

fn insert_path(
    record: &mut Record,
    parts: &[&str],
    value: Value,
    full_path: &str,
) -> Result<(), StoreError> {
    match parts {
        [] => Err(StoreError::Corrupt("empty field path".to_owned())),
        [leaf] => {
            record.insert((*leaf).to_owned(), value);
            Ok(())
        }
        [head, rest @ ..] => {
            let entry = record
                .entry((*head).to_owned())
                .or_insert_with(|| Value::Record(Record::new()));
            match entry {
                Value::Record(inner) => insert_path(inner, rest, value, full_path),
                _ => Err(StoreError::Corrupt(format!(
                    "path `{full_path}` traverses a non-record field"
                ))),
            }
        }
    }
}
