//! In-process worker answering requests over a [`MessageTransport`].
//!
//! [`LocalWorker`] listens on its action and config topics, hands each
//! request to an [`ActionHandler`], and publishes the outcome on its reply
//! topic. Bodies longer than the size last pushed by the coordinator are
//! split into fragments on UTF-8 boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, trace, warn};

use crate::action::Action;
use crate::protocol::{
    ConfigEnvelope, ReplyId, ReplyMessage, ReplyType, RequestEnvelope, WorkerErrorBody,
};
use crate::transport::{
    MessageHandler, MessageTransport, SubscriptionId, Topic, TopicPattern, TransportError,
};
use crate::worker::{ConfigKey, WorkerId};

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::local_worker");

/// What a worker does in response to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Publish `body` as the terminal reply.
    Reply(String),
    /// Publish a worker error as the terminal reply.
    Error(WorkerErrorBody),
    /// Publish each update, then `reply` as the terminal reply.
    Progress {
        /// Progress update bodies, in order.
        updates: Vec<String>,
        /// Terminal reply body.
        reply: String,
    },
    /// Publish nothing.
    Silent,
}

impl WorkerOutcome {
    /// Terminal reply carrying `value` serialised as JSON.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Reply(value.to_string())
    }

    /// Worker error with no detail.
    #[must_use]
    pub fn error(error_str: impl Into<String>) -> Self {
        Self::Error(WorkerErrorBody::new(error_str, None))
    }
}

/// Computes the outcome of one request.
pub trait ActionHandler: Send + Sync {
    /// Handles `action` with its parameter.
    fn handle(&self, action: Action, param: &serde_json::Value) -> WorkerOutcome;
}

impl<F> ActionHandler for F
where
    F: Fn(Action, &serde_json::Value) -> WorkerOutcome + Send + Sync,
{
    fn handle(&self, action: Action, param: &serde_json::Value) -> WorkerOutcome {
        self(action, param)
    }
}

struct WorkerCore {
    worker: WorkerId,
    reply_topic: Topic,
    transport: Arc<dyn MessageTransport>,
    handler: Arc<dyn ActionHandler>,
    // Zero means no limit has been pushed.
    max_reply_payload_bytes: AtomicUsize,
}

impl WorkerCore {
    fn on_action(&self, payload: &[u8]) {
        let request: RequestEnvelope = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    target: WORKER_TARGET,
                    worker = %self.worker,
                    error = %error,
                    "ignoring malformed request"
                );
                return;
            }
        };
        let (action, id) = (request.action(), request.id());
        debug!(
            target: WORKER_TARGET,
            worker = %self.worker,
            action = %action,
            id = %id,
            "handling request"
        );
        let published = match self.handler.handle(action, request.param()) {
            WorkerOutcome::Reply(body) => self.publish(id, ReplyType::Finish, &body),
            WorkerOutcome::Error(error) => match serde_json::to_string(&error) {
                Ok(body) => self.publish(id, ReplyType::Finish, &body),
                Err(encode_error) => {
                    warn!(
                        target: WORKER_TARGET,
                        id = %id,
                        error = %encode_error,
                        "failed to encode worker error"
                    );
                    Ok(())
                }
            },
            WorkerOutcome::Progress { updates, reply } => updates
                .iter()
                .try_for_each(|update| self.publish(id, ReplyType::Update, update))
                .and_then(|()| self.publish(id, ReplyType::Finish, &reply)),
            WorkerOutcome::Silent => {
                trace!(target: WORKER_TARGET, id = %id, "staying silent");
                Ok(())
            }
        };
        if let Err(error) = published {
            warn!(
                target: WORKER_TARGET,
                worker = %self.worker,
                id = %id,
                error = %error,
                "failed to publish reply"
            );
        }
    }

    fn on_config(&self, payload: &[u8]) {
        let envelope: ConfigEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    target: WORKER_TARGET,
                    worker = %self.worker,
                    error = %error,
                    "ignoring malformed config"
                );
                return;
            }
        };
        match envelope.key() {
            ConfigKey::MaxReplyPayloadBytes => {
                let Some(bytes) = envelope
                    .value()
                    .as_u64()
                    .and_then(|value| usize::try_from(value).ok())
                else {
                    warn!(
                        target: WORKER_TARGET,
                        worker = %self.worker,
                        value = %envelope.value(),
                        "ignoring non-numeric max reply size"
                    );
                    return;
                };
                self.max_reply_payload_bytes.store(bytes, Ordering::Release);
                debug!(
                    target: WORKER_TARGET,
                    worker = %self.worker,
                    bytes,
                    "max reply size updated"
                );
            }
        }
    }

    fn publish(&self, id: ReplyId, kind: ReplyType, body: &str) -> Result<(), TransportError> {
        let limit = self.max_reply_payload_bytes.load(Ordering::Acquire);
        let chunks = split_body(body, limit);
        let Ok(total) = u32::try_from(chunks.len()) else {
            return Err(TransportError::Rejected {
                topic: self.reply_topic.to_string(),
                message: String::from("reply needs more fragments than fit in u32"),
            });
        };
        for (index, chunk) in (1..=total).zip(chunks) {
            let message = ReplyMessage::new(id, kind, index, total, chunk.to_owned());
            let payload = message.to_vec().map_err(|error| TransportError::Rejected {
                topic: self.reply_topic.to_string(),
                message: error.to_string(),
            })?;
            self.transport.publish(&self.reply_topic, payload)?;
        }
        Ok(())
    }
}

/// Splits `body` into pieces of at most `limit` bytes without cutting a
/// character. A zero limit disables splitting. A single character wider than
/// `limit` gets a piece of its own.
pub(crate) fn split_body(body: &str, limit: usize) -> Vec<&str> {
    if limit == 0 || body.len() <= limit {
        return vec![body];
    }
    let mut pieces = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let mut cut = limit.min(rest.len());
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let Some((head, tail)) = rest.split_at_checked(cut) else {
            pieces.push(rest);
            break;
        };
        pieces.push(head);
        rest = tail;
    }
    pieces
}

/// Worker running inside the coordinator process.
///
/// Dropping the worker unsubscribes it.
pub struct LocalWorker {
    core: Arc<WorkerCore>,
    subscriptions: Vec<SubscriptionId>,
}

impl std::fmt::Debug for LocalWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorker")
            .field("worker", &self.core.worker)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl LocalWorker {
    /// Subscribes a worker named `worker` under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when either subscription fails; nothing
    /// stays subscribed.
    pub fn start(
        worker: WorkerId,
        prefix: &str,
        transport: Arc<dyn MessageTransport>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, TransportError> {
        let core = Arc::new(WorkerCore {
            worker,
            reply_topic: Topic::reply(prefix, worker),
            transport,
            handler,
            max_reply_payload_bytes: AtomicUsize::new(0),
        });
        let mut started = Self {
            core: Arc::clone(&core),
            subscriptions: Vec::with_capacity(2),
        };

        let action_core = Arc::clone(&core);
        let on_action: Arc<dyn MessageHandler> =
            Arc::new(move |_topic: &str, payload: &[u8]| action_core.on_action(payload));
        started.subscribe(TopicPattern::exact(&Topic::action(prefix, worker)), on_action)?;

        let config_core = Arc::clone(&core);
        let on_config: Arc<dyn MessageHandler> =
            Arc::new(move |_topic: &str, payload: &[u8]| config_core.on_config(payload));
        started.subscribe(TopicPattern::exact(&Topic::config(prefix, worker)), on_config)?;

        debug!(target: WORKER_TARGET, worker = %worker, prefix, "local worker started");
        Ok(started)
    }

    /// Identity the worker answers as.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.core.worker
    }

    /// Maximum reply fragment size last pushed, if any.
    #[must_use]
    pub fn max_reply_payload_bytes(&self) -> Option<usize> {
        match self.core.max_reply_payload_bytes.load(Ordering::Acquire) {
            0 => None,
            bytes => Some(bytes),
        }
    }

    /// Unsubscribes from every topic. Idempotent.
    pub fn stop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            if let Err(error) = self.core.transport.unsubscribe(subscription) {
                debug!(
                    target: WORKER_TARGET,
                    worker = %self.core.worker,
                    error = %error,
                    "failed to unsubscribe local worker"
                );
            }
        }
    }

    fn subscribe(
        &mut self,
        pattern: TopicPattern,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError> {
        let subscription = self.core.transport.subscribe(pattern, handler)?;
        self.subscriptions.push(subscription);
        Ok(())
    }
}

impl Drop for LocalWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
