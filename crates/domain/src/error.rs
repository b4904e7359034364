//! Service-level error type.

use thiserror::Error;

use tidings_core::DomainError;
use tidings_store::StoreError;

use crate::transport::TransportError;

/// Error surfaced by the domain services and the scheduler.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Delivery(#[from] TransportError),

    /// The free-text location did not resolve to any known timezone.
    #[error("location not supported: {0}")]
    UnsupportedLocation(String),
}
