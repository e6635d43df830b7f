pub mod local;
pub mod messages;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

pub use local::LocalBus;

/// A single-reply correlation registered on a topic. Construction (the
/// only moment the correlation actually needs to exist in whatever table
/// the bus implementation keeps) happens synchronously in
/// `MessageBus::register_reply`, before the caller publishes the command
/// that will trigger the reply — so there is no window where a very fast
/// responder's publish arrives before anyone is listening for it.
///
/// Dropping a `ReplyWaiter` without calling `wait` — an early return, a
/// panic — still releases the correlation entry, so a response topic
/// never leaks past the attempt that registered it.
pub struct ReplyWaiter {
    rx: oneshot::Receiver<Vec<u8>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ReplyWaiter {
    pub fn new(rx: oneshot::Receiver<Vec<u8>>, on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, on_drop: Some(Box::new(on_drop)) }
    }

    pub async fn wait(mut self, timeout: std::time::Duration) -> Option<Vec<u8>> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(payload)) => Some(payload),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

impl Drop for ReplyWaiter {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

/// Publish/subscribe message bus, QoS 0. This is the system's own
/// interface onto an external broker that runs out of process — only
/// the shape (topics, at-least-once delivery, ephemeral reply
/// correlation) is this crate's concern.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish: delivery is QoS 0, with no delivery
    /// acknowledgement back to the caller.
    async fn publish(&self, topic: &str, payload: Vec<u8>);

    /// Subscribe to a topic that may receive many messages over time
    /// (command topics, event topics, route topics). Delivery is
    /// at-least-once to each live subscriber.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>>;

    /// Registers a one-shot correlation for a single expected reply on
    /// `topic` and returns a handle to wait on it. This replaces an
    /// ephemeral per-attempt subscribe/unsubscribe with a correlation-map
    /// lookup, while preserving the same wire contract: the sender still
    /// publishes a response on the response topic, it just happens to be
    /// consumed here instead of via a fresh subscription. Callers must
    /// register before publishing the command that triggers the reply.
    fn register_reply(&self, topic: &str) -> ReplyWaiter;
}
