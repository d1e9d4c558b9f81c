use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use strata_core::AggregateId;

/// An immutable record of something that happened to an aggregate.
///
/// This is the unit you append to an aggregate stream and publish on the bus.
///
/// Notes:
/// - `version` is the position in the aggregate stream (1, 2, 3, …).
/// - `payload` is collaborator-owned; neither the store nor the bus looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    payload: JsonValue,
    timestamp: DateTime<Utc>,

    aggregate_type: String,
    aggregate_id: AggregateId,

    version: u64,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(
        event_type: impl Into<String>,
        payload: JsonValue,
        aggregate_type: impl Into<String>,
        aggregate_id: AggregateId,
        version: u64,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            version,
        }
    }

    /// Override the timestamp (business time, or deterministic tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Build an event from a typed domain event by serializing it to JSON.
    ///
    /// The event type and timestamp are taken from the typed event so that
    /// consumers can route on them without deserializing the payload.
    pub fn from_typed<E>(
        aggregate_type: impl Into<String>,
        aggregate_id: AggregateId,
        version: u64,
        event: &E,
    ) -> serde_json::Result<Self>
    where
        E: TypedEvent,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload,
            timestamp: event.occurred_at(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            version,
        })
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Decode the payload back into a typed domain event.
    pub fn decode<E>(&self) -> serde_json::Result<E>
    where
        E: TypedEvent,
    {
        serde_json::from_value(self.payload.clone())
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.event_type, self.version)
    }
}

/// A collaborator-defined domain event.
///
/// Typed events are:
/// - **immutable** (treat them as facts)
/// - **serializable** (the store keeps them as JSON payloads)
pub trait TypedEvent:
    Serialize + serde::de::DeserializeOwned + core::fmt::Debug + Send + Sync + 'static
{
    /// Stable event name/type identifier (e.g. "order.created").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
