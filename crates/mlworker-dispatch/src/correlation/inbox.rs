//! Bounded per-request reply queue.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use super::CORRELATION_TARGET;
use crate::assembler::{
    AssemblyOutcome, DropReason, FragmentBuffer, FragmentError, FragmentProgress,
};
use crate::protocol::{ReplyId, ReplyMessage};

/// Why [`Inbox::wait_final`] returned without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The deadline passed first.
    #[error("deadline elapsed before the final reply arrived")]
    TimedOut,
    /// The wait was interrupted by a cancellation.
    #[error("wait was interrupted")]
    Interrupted,
    /// The inbox was closed while waiting.
    #[error("inbox was closed")]
    Closed,
    /// The reply arrived in fragments that can never be reassembled.
    #[error("reply fragments were rejected: {0}")]
    Rejected(FragmentError),
}

#[derive(Debug, Default)]
struct InboxState {
    queue: VecDeque<ReplyMessage>,
    fragments: Option<FragmentBuffer>,
    rejected: Option<FragmentError>,
    finished: bool,
    interrupted: bool,
    closed: bool,
}

impl InboxState {
    const fn accepts_messages(&self) -> bool {
        !(self.closed || self.finished || self.rejected.is_some())
    }

    fn take_final(&mut self) -> Option<String> {
        while let Some(message) = self.queue.pop_front() {
            if message.is_finish() {
                return Some(message.into_body());
            }
        }
        None
    }
}

/// Queue of replies for one outstanding request.
///
/// At most `capacity` messages are buffered. When full, the oldest progress
/// update is evicted; the terminal reply is never dropped. Nothing is
/// accepted after the terminal reply or after the inbox closes.
#[derive(Debug)]
pub struct Inbox {
    id: ReplyId,
    capacity: usize,
    state: Mutex<InboxState>,
    ready: Condvar,
}

impl Inbox {
    /// Builds an empty inbox; `capacity` is clamped to at least 1.
    #[must_use]
    pub fn new(id: ReplyId, capacity: usize) -> Self {
        Self {
            id,
            capacity: capacity.max(1),
            state: Mutex::new(InboxState::default()),
            ready: Condvar::new(),
        }
    }

    /// Correlation identifier served by this inbox.
    #[must_use]
    pub const fn id(&self) -> ReplyId {
        self.id
    }

    /// Queues a complete reply and wakes waiters.
    pub fn deliver(&self, message: ReplyMessage) -> AssemblyOutcome {
        let mut state = self.lock();
        self.push(&mut state, message)
    }

    /// Buffers one fragment of a multi-part reply, delivering the
    /// reassembled message once every part has arrived.
    ///
    /// A fragment of a different reply type starts a new buffer. Fragments
    /// repeating the last reassembled reply are dropped as duplicates.
    pub(crate) fn collect_fragment(&self, message: ReplyMessage) -> AssemblyOutcome {
        let mut state = self.lock();
        if !state.accepts_messages() {
            return AssemblyOutcome::Dropped(DropReason::Inactive);
        }
        if let Some(buffer) = &state.fragments {
            if buffer.is_redelivery(&message) {
                return AssemblyOutcome::Dropped(DropReason::Duplicate);
            }
            if !buffer.continues(&message) {
                state.fragments = None;
            }
        }
        let buffer = state
            .fragments
            .get_or_insert_with(|| FragmentBuffer::new(message.kind(), message.total()));
        match buffer.insert(message) {
            Err(error) => AssemblyOutcome::Dropped(DropReason::InvalidFragment(error)),
            Ok(FragmentProgress::Pending) => AssemblyOutcome::Buffered,
            Ok(FragmentProgress::Duplicate) => AssemblyOutcome::Dropped(DropReason::Duplicate),
            Ok(FragmentProgress::Complete(assembled)) => self.push(&mut state, assembled),
        }
    }

    /// Blocks until the terminal reply arrives and returns its body.
    ///
    /// Progress updates queued ahead of it are discarded. `None` waits
    /// without a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] when the deadline passes, the wait is
    /// interrupted, the reply is rejected or the inbox closes.
    pub fn wait_final(&self, deadline: Option<Instant>) -> Result<String, WaitError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(WaitError::Closed);
            }
            if let Some(body) = state.take_final() {
                return Ok(body);
            }
            if let Some(error) = state.rejected {
                return Err(WaitError::Rejected(error));
            }
            if state.interrupted {
                return Err(WaitError::Interrupted);
            }
            state = match deadline {
                None => self.ready.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(limit) => {
                    let remaining = limit.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(WaitError::TimedOut);
                    }
                    self.ready
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Body of the terminal reply if it has arrived, without consuming it.
    #[must_use]
    pub fn peek_final(&self) -> Option<String> {
        self.lock()
            .queue
            .back()
            .filter(|message| message.is_finish())
            .map(|message| message.body().to_owned())
    }

    /// Removes and returns queued progress update bodies, oldest first.
    pub fn drain_updates(&self) -> Vec<String> {
        let mut state = self.lock();
        let (updates, terminal): (VecDeque<_>, VecDeque<_>) = state
            .queue
            .drain(..)
            .partition(|message| !message.is_finish());
        state.queue = terminal;
        updates.into_iter().map(ReplyMessage::into_body).collect()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Fails the reply: waiters wake with [`WaitError::Rejected`] and
    /// nothing further is accepted. Ignored once the terminal reply is in.
    pub(crate) fn reject(&self, error: FragmentError) {
        {
            let mut state = self.lock();
            if !state.accepts_messages() {
                return;
            }
            state.rejected = Some(error);
            state.fragments = None;
        }
        self.ready.notify_all();
    }

    /// Wakes any waiter with [`WaitError::Interrupted`]. Sticky.
    pub fn interrupt(&self) {
        self.lock().interrupted = true;
        self.ready.notify_all();
    }

    /// Discards queued messages and partial fragments, then wakes waiters.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
            state.fragments = None;
        }
        self.ready.notify_all();
    }

    /// Returns `true` once [`Inbox::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn push(&self, state: &mut MutexGuard<'_, InboxState>, message: ReplyMessage) -> AssemblyOutcome {
        if !state.accepts_messages() {
            return AssemblyOutcome::Dropped(DropReason::Inactive);
        }
        if state.queue.len() >= self.capacity {
            if let Some(oldest) = state.queue.iter().position(|queued| !queued.is_finish()) {
                state.queue.remove(oldest);
                debug!(
                    target: CORRELATION_TARGET,
                    id = %self.id,
                    capacity = self.capacity,
                    "inbox full, evicted oldest update"
                );
            }
        }
        state.finished = message.is_finish();
        state.queue.push_back(message);
        self.ready.notify_all();
        AssemblyOutcome::Delivered
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
