//! Observers notified after an event commits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use hreg_types::{EventRef, EventType};

use crate::event::Event;

/// Called synchronously, in registration order, after every commit.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, event: &Event);
}

/// A committed event on its way to a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEvent {
    pub reference: EventRef,
    pub event_type: EventType,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
#[error("peer transport failed: {0}")]
pub struct TransportError(pub String);

/// Delivery of committed events to a remote peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, event: OutboundEvent) -> Result<(), TransportError>;
}

/// Forwards every committed event to a peer in a detached task.
///
/// Delivery failures are logged and dropped; they never reach the local
/// retry set.
pub struct NetworkForwarder<T> {
    transport: Arc<T>,
    runtime: Handle,
}

impl<T: PeerTransport + 'static> NetworkForwarder<T> {
    pub fn new(transport: Arc<T>, runtime: Handle) -> Self {
        Self { transport, runtime }
    }

    /// Bind to the runtime of the calling context, if there is one.
    pub fn on_current_runtime(transport: Arc<T>) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::new(transport, runtime))
    }
}

impl<T: PeerTransport + 'static> CommitListener for NetworkForwarder<T> {
    fn on_commit(&self, event: &Event) {
        let bytes = match event.marshal() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(event_ref = %event.reference(), error = %e, "cannot serialize event for forwarding");
                return;
            }
        };
        let outbound = OutboundEvent {
            reference: event.reference(),
            event_type: event.event_type().clone(),
            bytes,
        };
        let transport = Arc::clone(&self.transport);
        self.runtime.spawn(async move {
            let reference = outbound.reference;
            match transport.send(outbound).await {
                Ok(()) => debug!(event_ref = %reference, "event forwarded"),
                Err(e) => warn!(event_ref = %reference, error = %e, "event forwarding failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    struct ChannelTransport {
        tx: mpsc::UnboundedSender<OutboundEvent>,
    }

    #[async_trait]
    impl PeerTransport for ChannelTransport {
        async fn send(&self, event: OutboundEvent) -> Result<(), TransportError> {
            self.tx
                .send(event)
                .map_err(|e| TransportError(e.to_string()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl PeerTransport for Unreachable {
        async fn send(&self, _event: OutboundEvent) -> Result<(), TransportError> {
            Err(TransportError("connection refused".into()))
        }
    }

    fn event() -> Event {
        Event::create(EventType::register_endpoint(), &json!({"url": "https://peer"}), None).unwrap()
    }

    #[tokio::test]
    async fn forwards_serialized_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forwarder = NetworkForwarder::on_current_runtime(Arc::new(ChannelTransport { tx })).unwrap();

        let event = event();
        forwarder.on_commit(&event);

        let outbound = rx.recv().await.unwrap();
        assert_eq!(outbound.reference, event.reference());
        assert_eq!(outbound.event_type, EventType::register_endpoint());
        assert_eq!(Event::parse(&outbound.bytes).unwrap(), event);
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let forwarder = NetworkForwarder::new(Arc::new(Unreachable), Handle::current());
        forwarder.on_commit(&event());
        tokio::task::yield_now().await;
    }

    #[test]
    fn no_runtime_no_forwarder() {
        assert!(NetworkForwarder::on_current_runtime(Arc::new(Unreachable)).is_none());
    }
}
