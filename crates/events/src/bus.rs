//! Event publishing abstraction (mechanics only).
//!
//! The bus distributes events to handlers **after** they were saved to the
//! event store. It is in-process only:
//!
//! - **Synchronous**: handlers run on the publishing thread, in registration order
//! - **At-most-once**: each registered handler is called at most once per publish
//! - **No persistence**: the event store is the source of truth, not the bus
//!
//! Saving and publishing are not coupled automatically; the caller decides
//! when to publish (or opts into `PublishingEventStore` in `strata-infra`).

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::{Event, PublishError};

/// A channel-backed subscription to every event published on a bus.
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(event) => process(event)?,
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,  // Bus dropped
///     }
/// }
/// ```
///
/// Subscriptions are meant for single-threaded consumption. Events arrive in
/// the order they were published from any one thread; there is no ordering
/// between concurrent publishers.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Distributes published events to interested handlers.
///
/// ## Error Handling
///
/// `publish_event()` reports handler failures to the caller. The events are
/// already stored, so the caller may republish; handlers that already ran
/// will then see the event again.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`: multiple threads may publish
/// concurrently, each call walking its own snapshot of the handlers.
pub trait EventBus: Send + Sync {
    fn publish_event(&self, event: &Event) -> Result<(), PublishError>;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    fn publish_event(&self, event: &Event) -> Result<(), PublishError> {
        (**self).publish_event(event)
    }
}
