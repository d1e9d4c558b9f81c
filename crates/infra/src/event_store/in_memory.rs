use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use strata_core::{AggregateId, Namespace};
use strata_events::Event;

use super::r#trait::{EventStore, EventStoreError, EventStoreErrorKind, validate_batch};

#[derive(Debug)]
struct AggregateRecord {
    aggregate_id: AggregateId,
    /// Always equal to `events.len()`.
    version: u64,
    events: Vec<Event>,
}

/// All streams of one namespace, guarded by one lock.
type Shard = RwLock<HashMap<AggregateId, AggregateRecord>>;

/// In-memory append-only event store.
///
/// Streams are sharded per namespace: a save holds the exclusive lock of its
/// namespace for the whole check-then-write, so writers to the same aggregate
/// are serialized while other namespaces proceed concurrently. Nothing
/// survives the process.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    namespaces: RwLock<HashMap<Namespace, Arc<Shard>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored version of an aggregate (0 if it has no events).
    pub fn version(&self, namespace: &Namespace, id: AggregateId) -> Result<u64, EventStoreError> {
        let shard = self.shard(namespace);
        let records = shard.read().map_err(|_| poisoned(namespace))?;
        Ok(records.get(&id).map_or(0, |r| r.version))
    }

    /// Namespaces provisioned so far, sorted.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let table = self.table();
        let mut names: Vec<Namespace> = table.keys().cloned().collect();
        names.sort();
        names
    }

    /// Read access to the namespace table.
    ///
    /// The table only ever gains whole entries, so a poisoned lock still
    /// guards consistent data and belongs to no particular namespace.
    fn table(&self) -> RwLockReadGuard<'_, HashMap<Namespace, Arc<Shard>>> {
        self.namespaces.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the shard for `namespace`, creating it on first access.
    fn shard(&self, namespace: &Namespace) -> Arc<Shard> {
        if let Some(shard) = self.table().get(namespace) {
            return shard.clone();
        }

        // Another thread may have created it between the two locks; `entry`
        // keeps whichever shard got there first.
        let mut table = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        let shard = table.entry(namespace.clone()).or_insert_with(|| {
            tracing::debug!(namespace = %namespace, "provisioning namespace");
            Arc::default()
        });
        shard.clone()
    }
}

fn poisoned(namespace: &Namespace) -> EventStoreError {
    EventStoreError::new(EventStoreErrorKind::LockPoisoned, namespace.clone())
}

impl EventStore for InMemoryEventStore {
    fn save(
        &self,
        namespace: &Namespace,
        events: Vec<Event>,
        original_version: u64,
    ) -> Result<(), EventStoreError> {
        let aggregate_id = validate_batch(&events, original_version).map_err(|kind| {
            tracing::debug!(namespace = %namespace, error = %kind, "rejected event batch");
            EventStoreError::new(kind, namespace.clone())
        })?;

        let shard = self.shard(namespace);
        let mut records = shard.write().map_err(|_| poisoned(namespace))?;

        let count = events.len() as u64;
        // Ok(new version) on success, Err(stored version) on a failed check.
        let outcome = match records.entry(aggregate_id) {
            Entry::Vacant(slot) if original_version == 0 => {
                slot.insert(AggregateRecord {
                    aggregate_id,
                    version: count,
                    events,
                });
                Ok(count)
            }
            // A stream that doesn't exist is at version 0.
            Entry::Vacant(_) => Err(0),
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.version != original_version {
                    Err(record.version)
                } else {
                    debug_assert_eq!(record.aggregate_id, aggregate_id);
                    record.version += count;
                    record.events.extend(events);
                    Ok(record.version)
                }
            }
        };

        match outcome {
            Ok(stored) => {
                tracing::debug!(
                    namespace = %namespace,
                    aggregate_id = %aggregate_id,
                    from_version = original_version,
                    to_version = stored,
                    "saved events"
                );
                Ok(())
            }
            Err(actual) => {
                tracing::warn!(
                    namespace = %namespace,
                    aggregate_id = %aggregate_id,
                    expected = original_version,
                    actual,
                    "concurrency conflict on save"
                );
                Err(EventStoreError::new(
                    EventStoreErrorKind::ConcurrencyConflict {
                        expected: original_version,
                        actual,
                    },
                    namespace.clone(),
                ))
            }
        }
    }

    fn load(
        &self,
        namespace: &Namespace,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Vec<Event>, EventStoreError> {
        let shard = self.shard(namespace);
        let records = shard.read().map_err(|_| poisoned(namespace))?;

        let events = records
            .get(&id)
            .map(|r| r.events.clone())
            .unwrap_or_default();

        tracing::trace!(
            namespace = %namespace,
            aggregate_type,
            aggregate_id = %id,
            count = events.len(),
            "loaded events"
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use strata_core::Context;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name)
    }

    fn ev(event_type: &str, id: AggregateId, version: u64) -> Event {
        Event::new(event_type, json!({ "v": version }), "Order", id, version)
    }

    fn kind(err: EventStoreError) -> EventStoreErrorKind {
        err.kind
    }

    #[test]
    fn save_then_load_round_trips_in_order() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let batch = vec![ev("Created", id, 1), ev("Shipped", id, 2)];

        store.save(&ns("a"), batch.clone(), 0).unwrap();

        assert_eq!(store.load(&ns("a"), "Order", id).unwrap(), batch);
        assert_eq!(store.version(&ns("a"), id).unwrap(), 2);
    }

    #[test]
    fn append_advances_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.save(&ns("a"), vec![ev("Created", id, 1)], 0).unwrap();

        store
            .save(&ns("a"), vec![ev("Paid", id, 2), ev("Shipped", id, 3)], 1)
            .unwrap();

        let versions: Vec<u64> = store
            .load(&ns("a"), "Order", id)
            .unwrap()
            .iter()
            .map(Event::version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(store.version(&ns("a"), id).unwrap(), 3);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let err = store.save(&ns("a"), vec![], 0).unwrap_err();
        assert_eq!(err.kind, EventStoreErrorKind::NoEventsToAppend);
        assert_eq!(err.namespace, ns("a"));
    }

    #[test]
    fn mixed_aggregates_are_rejected_without_partial_write() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let err = store
            .save(&ns("a"), vec![ev("Created", a, 1), ev("Created", b, 2)], 0)
            .unwrap_err();

        assert_eq!(
            kind(err),
            EventStoreErrorKind::InvalidEvent {
                expected: a,
                found: b
            }
        );
        assert!(store.load(&ns("a"), "Order", a).unwrap().is_empty());
        assert!(store.load(&ns("a"), "Order", b).unwrap().is_empty());
    }

    #[test]
    fn version_gap_is_rejected_and_store_unchanged() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .save(&ns("a"), vec![ev("Created", id, 1), ev("Paid", id, 2)], 0)
            .unwrap();
        let before = store.load(&ns("a"), "Order", id).unwrap();

        let err = store
            .save(&ns("a"), vec![ev("Shipped", id, 3), ev("Closed", id, 5)], 2)
            .unwrap_err();

        assert_eq!(
            kind(err),
            EventStoreErrorKind::IncorrectEventVersion {
                expected: 4,
                found: 5
            }
        );
        assert_eq!(store.load(&ns("a"), "Order", id).unwrap(), before);
        assert_eq!(store.version(&ns("a"), id).unwrap(), 2);
    }

    #[test]
    fn first_version_must_follow_original_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let err = store.save(&ns("a"), vec![ev("Created", id, 2)], 0).unwrap_err();
        assert_eq!(
            kind(err),
            EventStoreErrorKind::IncorrectEventVersion {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn no_version_follows_the_largest_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let err = store
            .save(&ns("a"), vec![ev("Created", id, u64::MAX)], u64::MAX)
            .unwrap_err();

        assert_eq!(
            kind(err),
            EventStoreErrorKind::IncorrectEventVersion {
                expected: u64::MAX,
                found: u64::MAX
            }
        );
        assert!(store.load(&ns("a"), "Order", id).unwrap().is_empty());
        assert_eq!(store.version(&ns("a"), id).unwrap(), 0);
    }

    #[test]
    fn stale_original_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .save(&ns("a"), vec![ev("Created", id, 1), ev("Shipped", id, 2)], 0)
            .unwrap();

        let err = store.save(&ns("a"), vec![ev("Cancelled", id, 2)], 1).unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(
            kind(err),
            EventStoreErrorKind::ConcurrencyConflict {
                expected: 1,
                actual: 2
            }
        );
        assert_eq!(store.version(&ns("a"), id).unwrap(), 2);
    }

    #[test]
    fn recreating_an_existing_aggregate_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let original = vec![ev("Created", id, 1)];
        store.save(&ns("a"), original.clone(), 0).unwrap();

        let err = store.save(&ns("a"), vec![ev("Created", id, 1)], 0).unwrap_err();

        assert_eq!(
            kind(err),
            EventStoreErrorKind::ConcurrencyConflict {
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(store.load(&ns("a"), "Order", id).unwrap(), original);
    }

    #[test]
    fn appending_to_missing_aggregate_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let err = store.save(&ns("a"), vec![ev("Shipped", id, 4)], 3).unwrap_err();

        assert_eq!(
            kind(err),
            EventStoreErrorKind::ConcurrencyConflict {
                expected: 3,
                actual: 0
            }
        );
        assert!(store.load(&ns("a"), "Order", id).unwrap().is_empty());
    }

    #[test]
    fn load_of_unknown_aggregate_is_empty() {
        let store = InMemoryEventStore::new();
        let events = store.load(&ns("a"), "Order", AggregateId::new()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.save(&ns("a"), vec![ev("Created", id, 1)], 0).unwrap();

        assert!(store.load(&ns("b"), "Order", id).unwrap().is_empty());

        // The same id starts its own stream in "b".
        store.save(&ns("b"), vec![ev("Imported", id, 1)], 0).unwrap();
        assert_eq!(store.load(&ns("a"), "Order", id).unwrap()[0].event_type(), "Created");
        assert_eq!(store.load(&ns("b"), "Order", id).unwrap()[0].event_type(), "Imported");
    }

    #[test]
    fn namespaces_are_provisioned_on_first_access() {
        let store = InMemoryEventStore::new();
        assert!(store.namespaces().is_empty());

        store.load(&ns("reader"), "Order", AggregateId::new()).unwrap();
        store
            .save(&ns("writer"), vec![ev("Created", AggregateId::new(), 1)], 0)
            .unwrap();

        assert_eq!(store.namespaces(), vec![ns("reader"), ns("writer")]);
    }

    #[test]
    fn poisoned_namespace_table_keeps_serving() {
        let store = Arc::new(InMemoryEventStore::new());
        store.load(&ns("before"), "Order", AggregateId::new()).unwrap();

        let poisoner = store.clone();
        let panicked = std::thread::spawn(move || {
            let _table = poisoner.namespaces.write().unwrap();
            panic!("writer died holding the namespace table");
        })
        .join();
        assert!(panicked.is_err());
        assert!(store.namespaces.is_poisoned());

        let id = AggregateId::new();
        store.save(&ns("after"), vec![ev("Created", id, 1)], 0).unwrap();
        assert_eq!(store.namespaces(), vec![ns("after"), ns("before")]);
        assert_eq!(store.load(&ns("after"), "Order", id).unwrap().len(), 1);
    }

    #[test]
    fn context_without_namespace_uses_default() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .save_in(&Context::new(), vec![ev("Created", id, 1)], 0)
            .unwrap();

        assert_eq!(store.load(&Namespace::default(), "Order", id).unwrap().len(), 1);
        let scoped = Context::new().with_namespace("other");
        assert!(store.load_in(&scoped, "Order", id).unwrap().is_empty());
    }

    #[test]
    fn errors_are_annotated_with_the_active_namespace() {
        let store = InMemoryEventStore::new();
        let ctx = Context::new().with_namespace("tenant-7");

        let err = store.save_in(&ctx, vec![], 0).unwrap_err();

        assert_eq!(err.namespace(), &ns("tenant-7"));
        assert_eq!(err.to_string(), "no events to append (namespace: tenant-7)");
    }

    #[test]
    fn loaded_events_are_copies() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.save(&ns("a"), vec![ev("Created", id, 1)], 0).unwrap();

        let mut loaded = store.load(&ns("a"), "Order", id).unwrap();
        loaded.clear();

        assert_eq!(store.load(&ns("a"), "Order", id).unwrap().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: any batch split of versions 1..=n saves cleanly and loads back unchanged.
        #[test]
        fn split_batches_round_trip(sizes in prop::collection::vec(1usize..5, 1..8)) {
            let store = InMemoryEventStore::new();
            let id = AggregateId::new();
            let mut all = Vec::new();
            let mut version = 0u64;

            for size in sizes {
                let batch: Vec<Event> = (1..=size as u64)
                    .map(|i| ev("Step", id, version + i))
                    .collect();
                store.save(&ns("p"), batch.clone(), version).unwrap();
                version += size as u64;
                all.extend(batch);
            }

            prop_assert_eq!(store.load(&ns("p"), "Order", id).unwrap(), all);
            prop_assert_eq!(store.version(&ns("p"), id).unwrap(), version);
        }

        /// Property: a batch whose versions deviate anywhere is rejected and leaves nothing behind.
        #[test]
        fn non_contiguous_batches_are_rejected(
            len in 1usize..6,
            bad_index in 0usize..6,
            skew in 1u64..4,
        ) {
            let bad_index = bad_index % len;
            let store = InMemoryEventStore::new();
            let id = AggregateId::new();
            let batch: Vec<Event> = (0..len as u64)
                .map(|i| {
                    let v = i + 1 + if i as usize == bad_index { skew } else { 0 };
                    ev("Step", id, v)
                })
                .collect();

            let err = store.save(&ns("p"), batch, 0).unwrap_err();

            let is_version_error = matches!(
                err.kind,
                EventStoreErrorKind::IncorrectEventVersion { .. }
            );
            prop_assert!(is_version_error);
            prop_assert!(store.load(&ns("p"), "Order", id).unwrap().is_empty());
        }
    }
}
