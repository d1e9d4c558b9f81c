use std::sync::Arc;

use thiserror::Error;

use strata_core::{AggregateId, Context, Namespace};
use strata_events::Event;

/// Why an event store operation was rejected.
///
/// Validation kinds (`NoEventsToAppend`, `InvalidEvent`, `IncorrectEventVersion`)
/// are decided on the batch alone, before the store is touched.
/// `ConcurrencyConflict` means another writer advanced the aggregate since the
/// caller read it: reload, reapply and retry is up to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreErrorKind {
    #[error("no events to append")]
    NoEventsToAppend,

    #[error("invalid event: batch mixes aggregate {expected} with {found}")]
    InvalidEvent {
        expected: AggregateId,
        found: AggregateId,
    },

    #[error("incorrect event version: expected {expected}, found {found}")]
    IncorrectEventVersion { expected: u64, found: u64 },

    #[error("concurrency conflict: expected stored version {expected}, found {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    #[error("event store lock poisoned")]
    LockPoisoned,

    /// Publication failed after a successful save (events remain stored).
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Event store operation error, annotated with the namespace it happened in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} (namespace: {namespace})")]
pub struct EventStoreError {
    pub kind: EventStoreErrorKind,
    pub namespace: Namespace,
}

impl EventStoreError {
    pub fn new(kind: EventStoreErrorKind, namespace: Namespace) -> Self {
        Self { kind, namespace }
    }

    pub fn kind(&self) -> &EventStoreErrorKind {
        &self.kind
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, EventStoreErrorKind::ConcurrencyConflict { .. })
    }
}

/// Append-only, namespace-scoped event store.
///
/// Events are organized into **streams**, one per `(namespace, aggregate id)`.
/// Within a stream, versions are exactly 1, 2, 3, … with no gaps or repeats.
///
/// ## Save Semantics
///
/// `save()`:
/// - Rejects an empty batch
/// - Requires every event to target the first event's aggregate
/// - Requires versions `original_version + 1, + 2, …`
/// - Checks optimistic concurrency: the stored version must equal `original_version`
///   (`0` means "new aggregate": the stream must not exist yet)
/// - Persists the batch atomically (all or nothing)
///
/// ## Load Semantics
///
/// `load()`:
/// - Returns copies of every event for the namespace + aggregate, in version order
/// - Returns an empty vector if the stream doesn't exist
///
/// Both operations provision the namespace on first access.
pub trait EventStore: Send + Sync {
    /// Append a batch of events for one aggregate.
    fn save(
        &self,
        namespace: &Namespace,
        events: Vec<Event>,
        original_version: u64,
    ) -> Result<(), EventStoreError>;

    /// Load the full stream for a namespace + aggregate.
    fn load(
        &self,
        namespace: &Namespace,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// [`save`](Self::save) in the namespace resolved from `ctx`.
    fn save_in(
        &self,
        ctx: &Context,
        events: Vec<Event>,
        original_version: u64,
    ) -> Result<(), EventStoreError> {
        self.save(&ctx.namespace(), events, original_version)
    }

    /// [`load`](Self::load) from the namespace resolved from `ctx`.
    fn load_in(
        &self,
        ctx: &Context,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Vec<Event>, EventStoreError> {
        self.load(&ctx.namespace(), aggregate_type, id)
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn save(
        &self,
        namespace: &Namespace,
        events: Vec<Event>,
        original_version: u64,
    ) -> Result<(), EventStoreError> {
        (**self).save(namespace, events, original_version)
    }

    fn load(
        &self,
        namespace: &Namespace,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Vec<Event>, EventStoreError> {
        (**self).load(namespace, aggregate_type, id)
    }
}

/// Validate a batch against `original_version` without touching any store.
///
/// Returns the aggregate the batch targets.
pub fn validate_batch(
    events: &[Event],
    original_version: u64,
) -> Result<AggregateId, EventStoreErrorKind> {
    let first = events.first().ok_or(EventStoreErrorKind::NoEventsToAppend)?;
    let aggregate_id = first.aggregate_id();

    let mut previous = original_version;
    for event in events {
        if event.aggregate_id() != aggregate_id {
            return Err(EventStoreErrorKind::InvalidEvent {
                expected: aggregate_id,
                found: event.aggregate_id(),
            });
        }

        // No version can follow `u64::MAX`.
        let Some(expected) = previous.checked_add(1) else {
            return Err(EventStoreErrorKind::IncorrectEventVersion {
                expected: previous,
                found: event.version(),
            });
        };
        if event.version() != expected {
            return Err(EventStoreErrorKind::IncorrectEventVersion {
                expected,
                found: event.version(),
            });
        }
        previous = expected;
    }

    Ok(aggregate_id)
}
