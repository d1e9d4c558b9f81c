//! Append-only event store boundary.
//!
//! This module defines the namespace-scoped store abstraction, its in-memory
//! implementation and an adapter that publishes after saving.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, EventStoreErrorKind, validate_batch};

use strata_core::{AggregateId, Namespace};
use strata_events::{Event, EventBus};

/// Adapter that publishes saved events to an `EventBus` after a successful save.
///
/// This ensures the ordering invariant: **publish happens only after save succeeds**.
/// The published events are the committed copies read back from the store, so
/// a rejected batch is dropped without being copied.
/// A failed publish leaves the events stored; the caller may republish them.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus,
{
    fn save(
        &self,
        namespace: &Namespace,
        events: Vec<Event>,
        original_version: u64,
    ) -> Result<(), EventStoreError> {
        let count = events.len();
        let stream = events
            .first()
            .map(|e| (e.aggregate_type().to_string(), e.aggregate_id()));

        // 1) Save (authoritative step)
        self.store.save(namespace, events, original_version)?;
        let Some((aggregate_type, id)) = stream else {
            return Ok(());
        };

        // 2) Publish the committed slice in stream order; later writers only
        //    append past it.
        let committed = self.store.load(namespace, &aggregate_type, id)?;
        let offset = usize::try_from(original_version).unwrap_or(usize::MAX);
        for event in committed.iter().skip(offset).take(count) {
            self.bus.publish_event(event).map_err(|err| {
                let kind = EventStoreErrorKind::Publish(err.to_string());
                EventStoreError::new(kind, namespace.clone())
            })?;
        }

        Ok(())
    }

    fn load(
        &self,
        namespace: &Namespace,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Vec<Event>, EventStoreError> {
        self.store.load(namespace, aggregate_type, id)
    }
}
