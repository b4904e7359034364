//! `tidings-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the binary identifier type, its process-scoped generator, the tagged value
//! model that entities are mapped through, and the domain error enum.

pub mod error;
pub mod id;
pub mod value;

pub use error::{DomainError, DomainResult};
pub use id::{IdGenerator, IdKind, Identifier};
pub use value::{Record, Value};
