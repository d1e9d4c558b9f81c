//! Events and in-process event distribution.

pub mod bus;
pub mod event;
pub mod handler;
pub mod internal_bus;

pub use bus::{EventBus, Subscription};
pub use event::{Event, TypedEvent};
pub use handler::EventHandler;
pub use internal_bus::{
    DeliveryPolicy, EventBusConfig, HandlerFailure, HandlerScope, InternalEventBus, PublishError,
};
