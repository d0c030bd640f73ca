//! In-process publish/subscribe bus.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, trace, warn};

use super::{
    MessageHandler, MessageTransport, SubscriptionId, TRANSPORT_TARGET, Topic, TopicPattern,
    TransportError,
};

enum Delivery {
    Message { topic: String, payload: Vec<u8> },
    Flush(mpsc::Sender<()>),
}

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: Arc<dyn MessageHandler>,
}

type Subscriptions = Arc<RwLock<Vec<Subscription>>>;

/// Transport that delivers every publish to matching in-process subscribers.
///
/// Messages are delivered in publication order on a single background
/// thread, so publishers never run subscriber code and handlers never run
/// concurrently with each other. Dropping the bus stops the thread.
pub struct LoopbackBus {
    subscriptions: Subscriptions,
    next_id: AtomicU64,
    sender: Mutex<Option<mpsc::Sender<Delivery>>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
    delivery_thread: ThreadId,
}

impl LoopbackBus {
    /// Starts a bus and its delivery thread.
    #[must_use]
    pub fn new() -> Self {
        let subscriptions: Subscriptions = Arc::default();
        let (sender, receiver) = mpsc::channel();
        let loop_subscriptions = Arc::clone(&subscriptions);
        let handle = thread::spawn(move || run_delivery_loop(&receiver, &loop_subscriptions));
        let delivery_thread = handle.thread().id();
        Self {
            subscriptions,
            next_id: AtomicU64::new(1),
            sender: Mutex::new(Some(sender)),
            delivery: Mutex::new(Some(handle)),
            delivery_thread,
        }
    }

    /// Blocks until every message published before the call was delivered.
    ///
    /// Returns immediately when called from a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the bus has shut down.
    pub fn flush(&self) -> Result<(), TransportError> {
        if thread::current().id() == self.delivery_thread {
            return Ok(());
        }
        let (ack, done) = mpsc::channel();
        self.enqueue(Delivery::Flush(ack))?;
        done.recv().map_err(|_| TransportError::Closed)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops accepting messages and waits for queued deliveries to finish.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        let joinable = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = joinable {
            if thread::current().id() == self.delivery_thread {
                return;
            }
            if handle.join().is_err() {
                warn!(target: TRANSPORT_TARGET, "loopback delivery thread panicked");
            }
        }
        debug!(target: TRANSPORT_TARGET, "loopback bus stopped");
    }

    fn enqueue(&self, delivery: Delivery) -> Result<(), TransportError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        sender.send(delivery).map_err(|_| TransportError::Closed)
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoopbackBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackBus")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl Drop for LoopbackBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MessageTransport for LoopbackBus {
    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), TransportError> {
        trace!(
            target: TRANSPORT_TARGET,
            topic = %topic,
            bytes = payload.len(),
            "publishing"
        );
        self.enqueue(Delivery::Message {
            topic: topic.as_str().to_owned(),
            payload,
        })
    }

    fn subscribe(
        &self,
        pattern: TopicPattern,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, TransportError> {
        if self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            return Err(TransportError::Closed);
        }
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            target: TRANSPORT_TARGET,
            pattern = %pattern,
            subscription = id.get(),
            "subscribed"
        );
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                pattern,
                handler,
            });
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|entry| entry.id != subscription);
        Ok(())
    }
}

fn run_delivery_loop(receiver: &mpsc::Receiver<Delivery>, subscriptions: &Subscriptions) {
    for delivery in receiver {
        match delivery {
            Delivery::Message { topic, payload } => deliver(subscriptions, &topic, &payload),
            Delivery::Flush(ack) => {
                if ack.send(()).is_err() {
                    trace!(target: TRANSPORT_TARGET, "flush requester went away");
                }
            }
        }
    }
}

fn deliver(subscriptions: &Subscriptions, topic: &str, payload: &[u8]) {
    // Handlers may subscribe or unsubscribe, so release the lock first.
    let handlers: Vec<Arc<dyn MessageHandler>> = subscriptions
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|entry| entry.pattern.matches(topic))
        .map(|entry| Arc::clone(&entry.handler))
        .collect();
    if handlers.is_empty() {
        trace!(target: TRANSPORT_TARGET, topic, "no subscriber for topic");
    }
    for handler in handlers {
        handler.on_message(topic, payload);
    }
}
