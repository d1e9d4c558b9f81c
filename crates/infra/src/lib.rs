//! Infrastructure layer: event storage and its composition with the event bus.

pub mod event_store;
