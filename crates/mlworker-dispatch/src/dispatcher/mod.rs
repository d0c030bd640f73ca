//! Request/reply calls against connected workers.
//!
//! [`Dispatcher`] owns the worker registry and the correlation table and
//! subscribes one [`ReplyAssembler`] to every worker's reply topic. Calls come
//! in two flavours:
//!
//! - [`Dispatcher::perform`] publishes a request and blocks until the terminal
//!   reply, a timeout, or a cancellation. The correlation entry is closed on
//!   every path.
//! - [`Dispatcher::trigger`] publishes and returns the [`ReplyId`]. The caller
//!   polls with [`Dispatcher::is_finished`] and [`Dispatcher::get_final`],
//!   or blocks with [`Dispatcher::block_await`], and finally calls
//!   [`Dispatcher::release`].
//!
//! Workers are never told about timeouts or cancellations; their late replies
//! find no entry and are dropped by the assembler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use mlworker_config::DispatchSettings;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::assembler::ReplyAssembler;
use crate::cancel::CancelToken;
use crate::correlation::{CorrelationTable, Inbox, WaitError};
use crate::error::DispatchError;
use crate::protocol::{ConfigEnvelope, ReplyId, RequestEnvelope};
use crate::registry::WorkerRegistry;
use crate::reply::{ReplyBody, decode_reply};
use crate::transport::{Channel, MessageTransport, SubscriptionId, Topic, TopicPattern};
use crate::worker::WorkerId;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatcher");

/// Closes its correlation entry when dropped.
struct OpenEntry<'a> {
    table: &'a CorrelationTable,
    id: ReplyId,
}

impl Drop for OpenEntry<'_> {
    fn drop(&mut self) {
        self.table.close(&self.id);
    }
}

/// Half-duplex RPC over a publish/subscribe transport.
pub struct Dispatcher {
    settings: DispatchSettings,
    transport: Arc<dyn MessageTransport>,
    registry: WorkerRegistry,
    table: Arc<CorrelationTable>,
    subscription: SubscriptionId,
    max_reply_payload_bytes: AtomicUsize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Builds a dispatcher and subscribes to `<prefix>/*/reply`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when the subscription fails.
    pub fn new(
        settings: DispatchSettings,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<Self, DispatchError> {
        let table = Arc::new(CorrelationTable::new(settings.inbox_capacity()));
        let assembler = ReplyAssembler::new(Arc::downgrade(&table), settings.max_fragments());
        let pattern = TopicPattern::every_worker(settings.topic_prefix(), Channel::Reply);
        debug!(target: DISPATCH_TARGET, pattern = %pattern, "subscribing reply assembler");
        let subscription = transport.subscribe(pattern, Arc::new(assembler))?;
        let max_reply_payload_bytes = AtomicUsize::new(settings.max_reply_payload_bytes());
        Ok(Self {
            settings,
            transport,
            registry: WorkerRegistry::new(),
            table,
            subscription,
            max_reply_payload_bytes,
        })
    }

    /// Settings the dispatcher was built with.
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Worker connection state.
    #[must_use]
    pub const fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Number of live correlation entries.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.table.len()
    }

    /// Largest reply fragment currently advertised to workers.
    #[must_use]
    pub fn max_reply_payload_bytes(&self) -> usize {
        self.max_reply_payload_bytes.load(Ordering::Acquire)
    }

    /// Marks `worker` connected and tells it the maximum reply size.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when the push fails; the worker
    /// stays connected.
    pub fn on_worker_connected(&self, worker: WorkerId) -> Result<(), DispatchError> {
        self.registry.on_connect(worker);
        self.notify_max_reply_payload_length(worker, self.max_reply_payload_bytes())
    }

    /// Marks `worker` disconnected. Outstanding calls run to their deadline.
    pub fn on_worker_disconnected(&self, worker: WorkerId) {
        self.registry.on_disconnect(worker);
    }

    /// Changes the advertised reply size and pushes it to connected workers.
    ///
    /// Replies split into more than `max_fragments` parts under the new size
    /// fail with [`DispatchError::ReplyRejected`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidReplyLimit`] for a zero size, leaving
    /// the advertised value unchanged, otherwise the first
    /// [`DispatchError::Transport`] raised by a push.
    pub fn set_max_reply_payload_length(&self, bytes: usize) -> Result<(), DispatchError> {
        if bytes == 0 {
            return Err(DispatchError::InvalidReplyLimit { bytes });
        }
        self.max_reply_payload_bytes.store(bytes, Ordering::Release);
        self.registry
            .connected_workers()
            .into_iter()
            .try_for_each(|worker| self.notify_max_reply_payload_length(worker, bytes))
    }

    /// Publishes the maximum reply size on the worker's config topic.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when the publish fails and
    /// [`DispatchError::EncodeRequest`] if the envelope cannot be encoded.
    pub fn notify_max_reply_payload_length(
        &self,
        worker: WorkerId,
        bytes: usize,
    ) -> Result<(), DispatchError> {
        let envelope = ConfigEnvelope::max_reply_payload_bytes(bytes);
        let payload = serde_json::to_vec(&envelope).map_err(DispatchError::EncodeRequest)?;
        let topic = Topic::config(self.settings.topic_prefix(), worker);
        self.transport.publish(&topic, payload)?;
        self.registry.set_max_reply_payload_length(worker, bytes);
        debug!(
            target: DISPATCH_TARGET,
            worker = %worker,
            bytes,
            "pushed max reply payload length"
        );
        Ok(())
    }

    /// Calls `action` on `worker` with the default deadline.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::perform_with_cancel`].
    pub fn perform<P>(
        &self,
        worker: WorkerId,
        action: Action,
        param: &P,
    ) -> Result<ReplyBody, DispatchError>
    where
        P: Serialize + ?Sized,
    {
        self.perform_with_timeout(worker, action, param, self.settings.default_timeout())
    }

    /// Calls `action` on `worker`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::perform_with_cancel`].
    pub fn perform_with_timeout<P>(
        &self,
        worker: WorkerId,
        action: Action,
        param: &P,
        timeout: Duration,
    ) -> Result<ReplyBody, DispatchError>
    where
        P: Serialize + ?Sized,
    {
        let value = encode_param(param)?;
        self.perform_value(worker, action, value, timeout, None)
    }

    /// Calls `action` on `worker`, waiting at most `timeout` unless `cancel`
    /// fires first.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::WorkerUnavailable`] when the worker is not
    ///   connected; nothing is published.
    /// - [`DispatchError::Timeout`] when no terminal reply arrives in time.
    /// - [`DispatchError::ReplyRejected`] when the worker splits its reply
    ///   into more fragments than the assembler accepts.
    /// - [`DispatchError::Cancelled`] when `cancel` fires or the dispatcher
    ///   shuts down.
    /// - [`DispatchError::Remote`] and [`DispatchError::Decode`] for terminal
    ///   bodies that are worker errors or fit no layout.
    /// - [`DispatchError::Transport`] and [`DispatchError::EncodeRequest`]
    ///   when the request cannot be sent.
    pub fn perform_with_cancel<P>(
        &self,
        worker: WorkerId,
        action: Action,
        param: &P,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ReplyBody, DispatchError>
    where
        P: Serialize + ?Sized,
    {
        let value = encode_param(param)?;
        self.perform_value(worker, action, value, timeout, Some(cancel))
    }

    fn perform_value(
        &self,
        worker: WorkerId,
        action: Action,
        param: serde_json::Value,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<ReplyBody, DispatchError> {
        let (id, inbox) = self.send(worker, action, param)?;
        let _entry = OpenEntry {
            table: &self.table,
            id,
        };
        let deadline = Instant::now().checked_add(timeout);
        match wait_for_final(&inbox, deadline, cancel) {
            Ok(body) => {
                debug!(
                    target: DISPATCH_TARGET,
                    worker = %worker,
                    action = %action,
                    id = %id,
                    bytes = body.len(),
                    "final reply received"
                );
                decode_final(action, id, &body)
            }
            Err(WaitError::TimedOut) => {
                warn!(
                    target: DISPATCH_TARGET,
                    worker = %worker,
                    action = %action,
                    id = %id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "request timed out"
                );
                Err(DispatchError::timeout(worker, action, id, timeout))
            }
            Err(WaitError::Rejected(source)) => {
                warn!(
                    target: DISPATCH_TARGET,
                    worker = %worker,
                    action = %action,
                    id = %id,
                    error = %source,
                    "reply rejected"
                );
                Err(DispatchError::ReplyRejected { id, source })
            }
            Err(WaitError::Interrupted | WaitError::Closed) => {
                info!(
                    target: DISPATCH_TARGET,
                    worker = %worker,
                    action = %action,
                    id = %id,
                    "request cancelled"
                );
                Err(DispatchError::Cancelled { id })
            }
        }
    }

    /// Publishes `action` to `worker` and returns without waiting.
    ///
    /// The caller owns the correlation entry and must eventually consume it
    /// with [`Dispatcher::block_await`] or drop it with
    /// [`Dispatcher::release`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerUnavailable`],
    /// [`DispatchError::Transport`] or [`DispatchError::EncodeRequest`] when
    /// the request cannot be sent; no entry is left behind.
    pub fn trigger<P>(
        &self,
        worker: WorkerId,
        action: Action,
        param: &P,
    ) -> Result<ReplyId, DispatchError>
    where
        P: Serialize + ?Sized,
    {
        let value = encode_param(param)?;
        self.send(worker, action, value).map(|(id, _)| id)
    }

    /// Returns `true` once the terminal reply for `id` has arrived.
    ///
    /// Unknown or released identifiers report `false`.
    #[must_use]
    pub fn is_finished(&self, id: ReplyId) -> bool {
        self.table
            .find(&id)
            .is_some_and(|inbox| inbox.peek_final().is_some())
    }

    /// Decodes the terminal reply for `id` without consuming it.
    ///
    /// Returns `Ok(None)` while the reply is outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownReply`] for identifiers with no entry
    /// and [`DispatchError::Remote`] or [`DispatchError::Decode`] for
    /// terminal bodies that are not results.
    pub fn get_final(
        &self,
        id: ReplyId,
        action: Action,
    ) -> Result<Option<ReplyBody>, DispatchError> {
        let inbox = self.table.find(&id).ok_or(DispatchError::UnknownReply { id })?;
        inbox
            .peek_final()
            .map(|body| decode_final(action, id, &body))
            .transpose()
    }

    /// Blocks until the terminal reply for `id` arrives, returning its raw
    /// body and closing the entry.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownReply`] for identifiers with no entry,
    /// [`DispatchError::ReplyRejected`] when the reply cannot be reassembled
    /// and [`DispatchError::Cancelled`] when the wait is cancelled or the
    /// dispatcher shuts down.
    pub fn block_await(&self, id: ReplyId) -> Result<String, DispatchError> {
        self.block_await_inner(id, None)
    }

    /// [`Dispatcher::block_await`] that `cancel` can interrupt.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::block_await`].
    pub fn block_await_with_cancel(
        &self,
        id: ReplyId,
        cancel: &CancelToken,
    ) -> Result<String, DispatchError> {
        self.block_await_inner(id, Some(cancel))
    }

    fn block_await_inner(
        &self,
        id: ReplyId,
        cancel: Option<&CancelToken>,
    ) -> Result<String, DispatchError> {
        let inbox = self.table.find(&id).ok_or(DispatchError::UnknownReply { id })?;
        let _entry = OpenEntry {
            table: &self.table,
            id,
        };
        wait_for_final(&inbox, None, cancel).map_err(|error| match error {
            WaitError::Rejected(source) => {
                warn!(target: DISPATCH_TARGET, id = %id, error = %source, "reply rejected");
                DispatchError::ReplyRejected { id, source }
            }
            WaitError::TimedOut | WaitError::Interrupted | WaitError::Closed => {
                info!(target: DISPATCH_TARGET, id = %id, "await cancelled");
                DispatchError::Cancelled { id }
            }
        })
    }

    /// Removes and returns progress updates queued for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownReply`] for identifiers with no entry.
    pub fn drain_updates(&self, id: ReplyId) -> Result<Vec<String>, DispatchError> {
        self.table
            .find(&id)
            .map(|inbox| inbox.drain_updates())
            .ok_or(DispatchError::UnknownReply { id })
    }

    /// Wakes the caller blocked on `id` with [`DispatchError::Cancelled`].
    /// Returns `false` for unknown identifiers.
    pub fn cancel(&self, id: ReplyId) -> bool {
        let Some(inbox) = self.table.find(&id) else {
            return false;
        };
        inbox.interrupt();
        true
    }

    /// Closes the entry for `id`. Returns `false` if it was already gone.
    pub fn release(&self, id: ReplyId) -> bool {
        self.table.close(&id)
    }

    /// Closes every entry, releasing all waiters with
    /// [`DispatchError::Cancelled`].
    pub fn shutdown(&self) {
        let outstanding = self.table.len();
        self.table.close_all();
        info!(target: DISPATCH_TARGET, outstanding, "dispatcher shut down");
    }

    fn send(
        &self,
        worker: WorkerId,
        action: Action,
        param: serde_json::Value,
    ) -> Result<(ReplyId, Arc<Inbox>), DispatchError> {
        if !self.registry.is_connected(worker) {
            warn!(
                target: DISPATCH_TARGET,
                worker = %worker,
                action = %action,
                "worker not connected"
            );
            return Err(DispatchError::WorkerUnavailable { worker });
        }
        let id = ReplyId::new();
        let inbox = self.table.open(id)?;
        let topic = Topic::action(self.settings.topic_prefix(), worker);
        let published = serde_json::to_vec(&RequestEnvelope::new(action, id, param))
            .map_err(DispatchError::EncodeRequest)
            .and_then(|payload| {
                self.transport
                    .publish(&topic, payload)
                    .map_err(DispatchError::from)
            });
        if let Err(error) = published {
            self.table.close(&id);
            warn!(
                target: DISPATCH_TARGET,
                worker = %worker,
                action = %action,
                id = %id,
                error = %error,
                "failed to send request"
            );
            return Err(error);
        }
        debug!(
            target: DISPATCH_TARGET,
            worker = %worker,
            action = %action,
            id = %id,
            "request published"
        );
        Ok((id, inbox))
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
        if let Err(error) = self.transport.unsubscribe(self.subscription) {
            debug!(
                target: DISPATCH_TARGET,
                error = %error,
                "failed to unsubscribe reply assembler"
            );
        }
    }
}

fn encode_param<P>(param: &P) -> Result<serde_json::Value, DispatchError>
where
    P: Serialize + ?Sized,
{
    serde_json::to_value(param).map_err(DispatchError::EncodeRequest)
}

fn decode_final(action: Action, id: ReplyId, body: &str) -> Result<ReplyBody, DispatchError> {
    decode_reply(action, body).map_err(|failure| {
        let error = DispatchError::from_decode_failure(action, failure);
        warn!(
            target: DISPATCH_TARGET,
            action = %action,
            id = %id,
            error = %error,
            "worker reply is not a result"
        );
        error
    })
}

fn wait_for_final(
    inbox: &Arc<Inbox>,
    deadline: Option<Instant>,
    cancel: Option<&CancelToken>,
) -> Result<String, WaitError> {
    let _attached = cancel.map(|token| token.attach(inbox));
    inbox.wait_final(deadline)
}
