//! In-process event bus with per-type and global handler registration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, mpsc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::{EventBus, Subscription};
use crate::{Event, EventHandler};

/// What the bus does with the remaining handlers once one of them fails.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Stop at the first failing handler and return its error.
    #[default]
    FailFast,
    /// Keep going and return every failure once all handlers ran.
    Isolate,
}

/// Bus configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub delivery: DeliveryPolicy,
}

/// Which registration list a handler was invoked from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandlerScope {
    /// Registered for the event's type tag.
    Typed,
    /// Registered for every event.
    Global,
}

impl core::fmt::Display for HandlerScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HandlerScope::Typed => f.write_str("typed"),
            HandlerScope::Global => f.write_str("global"),
        }
    }
}

/// One handler failure collected under [`DeliveryPolicy::Isolate`].
#[derive(Debug)]
pub struct HandlerFailure {
    pub scope: HandlerScope,
    /// Position of the handler in its registration list.
    pub position: usize,
    pub error: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// A handler failed and the remaining handlers were skipped.
    #[error("{scope} handler #{position} failed on {event_type}@{version}: {source}")]
    Handler {
        event_type: String,
        version: u64,
        scope: HandlerScope,
        position: usize,
        #[source]
        source: anyhow::Error,
    },

    /// One or more handlers failed; every handler was still invoked.
    #[error("{} handler(s) failed on {event_type}@{version}", .failures.len())]
    Handlers {
        event_type: String,
        version: u64,
        failures: Vec<HandlerFailure>,
    },
}

type HandlerList = Vec<Arc<dyn EventHandler>>;

#[derive(Default)]
struct Registry {
    event_handlers: HashMap<String, HandlerList>,
    global_handlers: HandlerList,
    subscribers: Vec<mpsc::Sender<Event>>,
}

/// Event bus that notifies registered handlers of published events.
///
/// - No IO / no async
/// - Handlers for the event's exact type run first, then global handlers,
///   each group in registration order
/// - Registration is append-only; registering a handler twice delivers twice
/// - Channel subscribers receive the event last and are dropped once their
///   receiver is gone
///
/// Publishing takes a snapshot of the handler lists and releases the
/// registry lock before invoking anything, so handlers may themselves
/// register handlers (effective from the next publish).
pub struct InternalEventBus {
    registry: RwLock<Registry>,
    config: EventBusConfig,
}

impl InternalEventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            config,
        }
    }

    pub fn config(&self) -> EventBusConfig {
        self.config
    }

    /// Register `handler` for events whose type tag equals `event_type`.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>, event_type: impl Into<String>) {
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, "registering event handler");

        // A single push cannot leave the registry half-updated, so a poisoned
        // lock still guards consistent data.
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.event_handlers.entry(event_type).or_default().push(handler);
    }

    /// Register `handler` for every published event.
    pub fn add_global_handler(&self, handler: Arc<dyn EventHandler>) {
        tracing::debug!("registering global event handler");

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.global_handlers.push(handler);
    }

    /// Subscribe to every published event through a channel.
    ///
    /// Subscribers are served after all handlers have run; a publish that
    /// fails fast does not reach them. The sender is discarded on the first
    /// publish after the returned subscription is dropped.
    pub fn subscribe(&self) -> Subscription<Event> {
        let (tx, rx) = mpsc::channel();
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.push(tx);
        Subscription::new(rx)
    }

    /// Number of live channel subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.subscribers.len()
    }

    /// Number of handlers registered for `event_type` (globals excluded).
    pub fn handler_count(&self, event_type: &str) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.event_handlers.get(event_type).map_or(0, Vec::len)
    }

    pub fn global_handler_count(&self) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.global_handlers.len()
    }

    fn snapshot(&self, event_type: &str) -> (HandlerList, HandlerList) {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let typed = registry.event_handlers.get(event_type).cloned().unwrap_or_default();
        (typed, registry.global_handlers.clone())
    }

    /// Send `event` to every subscriber, dropping those whose receiver is gone.
    fn notify_subscribers(&self, event: &Event) {
        if self.subscriber_count() == 0 {
            return;
        }

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let before = registry.subscribers.len();
        registry.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let dropped = before - registry.subscribers.len();
        if dropped > 0 {
            tracing::debug!(dropped, "removed closed subscriptions");
        }
    }
}

impl Default for InternalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InternalEventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let typed: HashMap<&str, usize> = registry
            .event_handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("InternalEventBus")
            .field("event_handlers", &typed)
            .field("global_handlers", &registry.global_handlers.len())
            .field("subscribers", &registry.subscribers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl EventBus for InternalEventBus {
    fn publish_event(&self, event: &Event) -> Result<(), PublishError> {
        let (typed, global) = self.snapshot(event.event_type());

        tracing::debug!(
            event_type = event.event_type(),
            version = event.version(),
            aggregate_id = %event.aggregate_id(),
            typed_handlers = typed.len(),
            global_handlers = global.len(),
            "publishing event"
        );

        let handlers = typed
            .iter()
            .enumerate()
            .map(|(i, h)| (HandlerScope::Typed, i, h))
            .chain(global.iter().enumerate().map(|(i, h)| (HandlerScope::Global, i, h)));

        let mut failures = Vec::new();
        for (scope, position, handler) in handlers {
            if let Err(error) = handler.handle_event(event) {
                tracing::warn!(
                    event_type = event.event_type(),
                    version = event.version(),
                    %scope,
                    position,
                    error = %error,
                    "event handler failed"
                );
                match self.config.delivery {
                    DeliveryPolicy::FailFast => {
                        return Err(PublishError::Handler {
                            event_type: event.event_type().to_string(),
                            version: event.version(),
                            scope,
                            position,
                            source: error,
                        });
                    }
                    DeliveryPolicy::Isolate => failures.push(HandlerFailure {
                        scope,
                        position,
                        error,
                    }),
                }
            }
        }

        self.notify_subscribers(event);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError::Handlers {
                event_type: event.event_type().to_string(),
                version: event.version(),
                failures,
            })
        }
    }
}
