use crate::Event;

/// Reacts to published events (projections, loggers, sagas, …).
///
/// The bus treats handlers as opaque callables: it never inspects their state
/// and calls them synchronously on the publishing thread. Returning an error
/// reports the failure to the publisher; see [`DeliveryPolicy`](crate::DeliveryPolicy)
/// for what happens to the handlers after it.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}
