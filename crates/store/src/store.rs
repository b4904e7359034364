//! The document store boundary.

use async_trait::async_trait;

use crate::document::{Document, IndexSpec};
use crate::error::StoreError;
use crate::filter::Query;

/// A generic document store holding one collection per entity.
///
/// No storage assumptions: the in-memory implementation backs tests and
/// development; a remote document database slots in behind the same trait.
/// All operations are async IO and may suspend the calling task.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declare a collection and its indexes. Idempotent.
    async fn register(&self, collection: &str, indexes: Vec<IndexSpec>) -> Result<(), StoreError>;

    /// Insert a batch of documents. Unique-constraint violations surface as
    /// [`StoreError::DuplicateKey`]; none of the batch is applied in that
    /// case.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError>;

    /// Apply a `$set`-equivalent patch (and optionally clear paths) on every
    /// matching document. Returns the number of documents updated.
    ///
    /// A patch path that traverses a field whose stored type conflicts with
    /// an implicit container fails with [`StoreError::PathConflict`] carrying
    /// the store's diagnostic; nothing is applied in that case.
    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        set: Document,
        unset: &[String],
    ) -> Result<u64, StoreError>;

    /// Delete matching documents; returns how many were removed.
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Option<Document>, StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}
