//! Store-level error taxonomy.

use thiserror::Error;
use tidings_core::DomainError;

/// Errors surfaced by the document store and the repositories over it.
///
/// `DuplicateKey` is surfaced to the business layer and never retried
/// automatically. `WriteConflict` is transient: the caller retries the whole
/// logical operation, not just the store call. The unsupported-type variants
/// are programming errors, fatal to the operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the conflicting
    /// key/value rendering from the store.
    #[error("duplicate key error: {key}={value}")]
    DuplicateKey { key: String, value: String },

    /// Transient store-level contention; retry the whole logical operation.
    #[error("write conflict, retry operation: error=`{0}`")]
    WriteConflict(String),

    /// A leaf value has no representation in the store.
    #[error("unsupported field type: {0}")]
    UnsupportedFieldType(String),

    /// A filter leaf value has no representation in the store.
    #[error("unsupported filter field type: {0}")]
    UnsupportedFilterFieldType(String),

    /// An update path traversed a field whose stored type conflicts with an
    /// implicit container. Carries the store's diagnostic message.
    #[error("schema path conflict: {0}")]
    PathConflict(String),

    /// A stored document could not be reconstructed.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] DomainError),

    /// Backend failure unrelated to the data (e.g. poisoned lock).
    #[error("storage error: {0}")]
    Backend(String),
}
