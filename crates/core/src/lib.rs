//! `strata-core` — foundation types shared by the event store and event bus.
//!
//! This crate contains **pure** primitives (no locking, no IO): identifiers,
//! the namespace partition key and the request context it is resolved from.

pub mod error;
pub mod id;
pub mod namespace;

pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use namespace::{Context, Namespace};
