//! `tidings-domain` — birthday-notification business logic.
//!
//! Entities, the services over their repositories, the job queue with its
//! merge semantics, and the scheduler driving dispatch and reconciliation.
//! External collaborators (delivery transport, timezone lookup) are traits;
//! production implementations live beside them.

pub mod config;
pub mod error;
mod fields;
pub mod job;
pub mod message;
pub mod scheduler;
pub mod timezone;
pub mod transport;
pub mod user;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError};
pub use error::ServiceError;
pub use job::{Job, JobQueue, JobStatus, JobType};
pub use message::{Message, MessageService};
pub use scheduler::Scheduler;
pub use timezone::{TimezoneResolver, ZoneTableResolver};
pub use transport::{DeliveryTransport, HttpDeliveryTransport, TransportError};
pub use user::{NewUser, User, UserService};
