//! Publish/subscribe capability used to reach workers.
//!
//! The dispatcher never owns a broker connection. Callers inject a
//! [`MessageTransport`]; [`LoopbackBus`] is the in-process implementation
//! used by the coordinator's own worker and by tests.

mod loopback;
mod topic;

use std::sync::Arc;

use thiserror::Error;

pub use self::loopback::LoopbackBus;
pub use self::topic::{Channel, Topic, TopicPattern};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Receives messages delivered on a subscribed topic.
///
/// Handlers run on the transport's delivery thread and must not block
/// waiting for further deliveries.
pub trait MessageHandler: Send + Sync {
    /// Handles one payload published on `topic`.
    fn on_message(&self, topic: &str, payload: &[u8]);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self(topic, payload);
    }
}

/// Opaque handle returned by [`MessageTransport::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw subscription number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw subscription number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Publish/subscribe fabric shared with workers.
pub trait MessageTransport: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the fabric refuses the message.
    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Delivers every message whose topic matches `pattern` to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the subscription cannot be created.
    fn subscribe(
        &self,
        pattern: TopicPattern,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Cancels a subscription. Unknown handles are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the fabric is unavailable.
    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;
}

/// Errors surfaced by a [`MessageTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport has shut down.
    #[error("transport is closed")]
    Closed,
    /// The fabric rejected a publish or subscription.
    #[error("transport rejected '{topic}': {message}")]
    Rejected {
        /// Topic or pattern involved.
        topic: String,
        /// Reason given by the fabric.
        message: String,
    },
}
