//! `tidings-store` — the generic document store boundary.
//!
//! One entity maps to one collection of flat, dotted-path documents. The store
//! itself only understands scalars, binary blobs and arrays; the mapper in
//! this crate records which fields must be reconstructed as identifiers or
//! arbitrary-precision decimals, and rebuilds them losslessly on read.

pub mod conflict;
pub mod document;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod memory;
pub mod repository;
pub mod store;

pub use conflict::classify_schema_conflict;
pub use document::{Document, IndexOrder, IndexSpec, StoreValue};
pub use error::StoreError;
pub use filter::{translate, Conditions, Filter, Query, QueryOp};
pub use mapper::{deserialize, flatten, serialize};
pub use memory::MemoryDocumentStore;
pub use repository::{Persistable, Repository, Target};
pub use store::DocumentStore;
