use std::sync::Arc;

use crate::error::HandlerResult;
use crate::event::Event;
use crate::lookup::EventLookup;

/// A callback run for every event of the types it is registered for.
///
/// Handlers see the committed state through `lookup`; the event being
/// handled is not yet part of it. Returning an error leaves the event
/// uncommitted and queued for retry.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event, lookup: &dyn EventLookup) -> HandlerResult;
}

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event, &dyn EventLookup) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: &Event, lookup: &dyn EventLookup) -> HandlerResult {
        (self.0)(event, lookup)
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event, &dyn EventLookup) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
