//! In-memory document store.
//!
//! Intended for tests/dev. Not optimized for performance; queries scan the
//! collection. Unique indexes and the path-conflict diagnostic behave like
//! the production store so the repository's error handling is exercised for
//! real.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::document::{Document, IndexSpec, StoreValue, PRIMARY_KEY, TAG_PREFIX};
use crate::error::StoreError;
use crate::filter::{Query, QueryOp};
use crate::store::DocumentStore;

#[derive(Debug, Default)]
struct Collection {
    indexes: Vec<IndexSpec>,
    docs: Vec<Document>,
}

/// In-memory [`DocumentStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_owned())
}

/// Evaluate one query clause list against a document field.
fn clause_matches(doc: &Document, path: &str, ops: &[(QueryOp, StoreValue)]) -> bool {
    let actual = doc.get(path);
    ops.iter().all(|(op, operand)| match op {
        QueryOp::Eq => actual.is_some_and(|v| v.store_eq(operand)),
        QueryOp::Ne => !actual.is_some_and(|v| v.store_eq(operand)),
        QueryOp::In => match operand {
            StoreValue::Array(options) => {
                actual.is_some_and(|v| options.iter().any(|o| v.store_eq(o)))
            }
            _ => false,
        },
        QueryOp::NotIn => match operand {
            StoreValue::Array(options) => {
                !actual.is_some_and(|v| options.iter().any(|o| v.store_eq(o)))
            }
            _ => false,
        },
        QueryOp::Gt => matches_ordering(actual, operand, |o| o == std::cmp::Ordering::Greater),
        QueryOp::Gte => matches_ordering(actual, operand, |o| o != std::cmp::Ordering::Less),
        QueryOp::Lt => matches_ordering(actual, operand, |o| o == std::cmp::Ordering::Less),
        QueryOp::Lte => matches_ordering(actual, operand, |o| o != std::cmp::Ordering::Greater),
    })
}

fn matches_ordering(
    actual: Option<&StoreValue>,
    operand: &StoreValue,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    actual
        .and_then(|v| v.compare(operand))
        .is_some_and(accept)
}

fn matches(doc: &Document, query: &Query) -> bool {
    let conjunction = query
        .clauses
        .iter()
        .all(|(path, ops)| clause_matches(doc, path, ops));
    if !conjunction {
        return false;
    }
    if query.or.is_empty() {
        true
    } else {
        query.or.iter().any(|alt| matches(doc, alt))
    }
}

/// Render a store value for the duplicate-key diagnostic.
fn render(value: Option<&StoreValue>) -> String {
    match value {
        None | Some(StoreValue::Null) => "null".to_owned(),
        Some(StoreValue::Text(s)) => format!("\"{s}\""),
        Some(other) => format!("{other:?}"),
    }
}

/// Check a candidate document against a unique index and the existing docs.
fn unique_violation(
    index_fields: &[String],
    candidate: &Document,
    existing: &[Document],
) -> Option<(String, String)> {
    let candidate_values: Vec<Option<&StoreValue>> =
        index_fields.iter().map(|f| candidate.get(f)).collect();

    for doc in existing {
        let clash = index_fields.iter().zip(&candidate_values).all(|(f, cv)| {
            match (doc.get(f), cv) {
                (Some(a), Some(b)) => a.store_eq(b),
                (None, None) => true,
                _ => false,
            }
        });
        if clash {
            let key = index_fields.join(",");
            let value = candidate_values
                .iter()
                .map(|v| render(*v))
                .collect::<Vec<_>>()
                .join(",");
            return Some((key, value));
        }
    }
    None
}

/// Detect a `$set` path that traverses a scalar, and produce the store's
/// code-28-shaped diagnostic for it.
fn path_conflict(doc: &Document, set: &Document) -> Option<String> {
    for path in set.keys() {
        if path.starts_with(TAG_PREFIX) {
            continue;
        }
        let segments: Vec<&str> = path.split('.').collect();
        for split in 1..segments.len() {
            let ancestor = segments[..split].join(".");
            if let Some(value) = doc.get(&ancestor) {
                let next = segments[split];
                return Some(format!(
                    "Cannot create field '{next}' in element {{{ancestor}: {}}}",
                    render(Some(value)),
                ));
            }
        }
    }
    None
}

/// Remove a path, everything nested under it, and its tag markers.
fn unset_path(doc: &mut Document, path: &str) {
    let nested_prefix = format!("{path}.");
    let tag_key = format!("{TAG_PREFIX}{path}");
    let tag_prefix = format!("{TAG_PREFIX}{path}.");
    doc.retain(|k, _| {
        k != path && !k.starts_with(&nested_prefix) && *k != tag_key && !k.starts_with(&tag_prefix)
    });
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn register(&self, collection: &str, indexes: Vec<IndexSpec>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let entry = collections.entry(collection.to_owned()).or_default();
        entry.indexes = indexes;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let entry = collections.entry(collection.to_owned()).or_default();

        // Validate the whole batch before applying any of it.
        let mut accepted: Vec<Document> = Vec::with_capacity(docs.len());
        let primary = [PRIMARY_KEY.to_owned()];
        for doc in docs {
            for pool in [&entry.docs, &accepted] {
                if doc.contains_key(PRIMARY_KEY) {
                    if let Some((key, value)) = unique_violation(&primary, &doc, pool) {
                        return Err(StoreError::DuplicateKey { key, value });
                    }
                }
                for index in entry.indexes.iter().filter(|i| i.unique) {
                    let fields: Vec<String> =
                        index.fields.iter().map(|(f, _)| f.clone()).collect();
                    if let Some((key, value)) = unique_violation(&fields, &doc, pool) {
                        return Err(StoreError::DuplicateKey { key, value });
                    }
                }
            }
            accepted.push(doc);
        }

        entry.docs.extend(accepted);
        Ok(())
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        set: Document,
        unset: &[String],
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let entry = collections.entry(collection.to_owned()).or_default();

        let matched: Vec<usize> = entry
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| matches(d, query))
            .map(|(i, _)| i)
            .collect();

        // Surface conflicts before mutating anything.
        for &i in &matched {
            if let Some(message) = path_conflict(&entry.docs[i], &set) {
                return Err(StoreError::PathConflict(message));
            }
        }

        for &i in &matched {
            let doc = &mut entry.docs[i];
            for path in unset {
                unset_path(doc, path);
            }
            for (k, v) in &set {
                doc.insert(k.clone(), v.clone());
            }
        }
        Ok(matched.len() as u64)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let entry = collections.entry(collection.to_owned()).or_default();
        let before = entry.docs.len();
        entry.docs.retain(|d| !matches(d, query));
        Ok((before - entry.docs.len()) as u64)
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.docs.iter().find(|d| matches(d, query)).cloned()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|d| matches(d, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
