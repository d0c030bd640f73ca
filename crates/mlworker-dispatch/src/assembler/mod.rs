//! Reassembles fragmented replies and routes them to waiting inboxes.
//!
//! The assembler is the reply-topic subscriber. Each message is parsed,
//! bounds-checked, and looked up in the [`CorrelationTable`]. Single-part
//! replies go straight to the inbox; multi-part replies are buffered inside
//! the inbox until every index has arrived, so closing an inbox also discards
//! any partial reply. Nothing here panics on bad input: malformed or late
//! messages are logged and dropped. A reply announcing more fragments than
//! the configured bound fails its waiting request instead of leaving it to
//! time out.

mod fragments;

use std::sync::Weak;

use tracing::{debug, trace, warn};

use crate::correlation::CorrelationTable;
use crate::protocol::{ReplyId, ReplyMessage};
use crate::transport::MessageHandler;

pub use self::fragments::FragmentError;
pub(crate) use self::fragments::{FragmentBuffer, FragmentProgress, check_bounds};

const ASSEMBLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::assembler");

/// Why a reply message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The payload was not a reply message.
    Malformed,
    /// No request is waiting on the identifier, typically a late reply.
    UnknownId,
    /// The inbox already holds its terminal reply or was closed.
    Inactive,
    /// The fragment index was already received.
    Duplicate,
    /// The fragment's position or count is unusable.
    InvalidFragment(FragmentError),
    /// The dispatcher that owned the table is gone.
    Detached,
}

/// What happened to one reply message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// A complete reply reached its inbox.
    Delivered,
    /// A fragment was stored awaiting the rest of its reply.
    Buffered,
    /// The message was discarded.
    Dropped(DropReason),
}

/// Reply-topic subscriber feeding the correlation table.
#[derive(Debug, Clone)]
pub struct ReplyAssembler {
    table: Weak<CorrelationTable>,
    max_fragments: u32,
}

impl ReplyAssembler {
    /// Builds an assembler delivering into `table`.
    #[must_use]
    pub const fn new(table: Weak<CorrelationTable>, max_fragments: u32) -> Self {
        Self {
            table,
            max_fragments,
        }
    }

    /// Parses and routes a raw reply payload.
    pub fn accept_bytes(&self, payload: &[u8]) -> AssemblyOutcome {
        match ReplyMessage::from_slice(payload) {
            Ok(message) => self.accept(message),
            Err(error) => {
                warn!(
                    target: ASSEMBLER_TARGET,
                    error = %error,
                    bytes = payload.len(),
                    "dropping malformed reply"
                );
                AssemblyOutcome::Dropped(DropReason::Malformed)
            }
        }
    }

    /// Routes a parsed reply message.
    pub fn accept(&self, message: ReplyMessage) -> AssemblyOutcome {
        let id = message.id();
        if let Err(error) = check_bounds(&message, self.max_fragments) {
            warn!(
                target: ASSEMBLER_TARGET,
                id = %id,
                error = %error,
                "dropping invalid reply fragment"
            );
            if matches!(error, FragmentError::TooManyFragments { .. }) {
                self.reject(&id, error);
            }
            return AssemblyOutcome::Dropped(DropReason::InvalidFragment(error));
        }
        let Some(table) = self.table.upgrade() else {
            trace!(target: ASSEMBLER_TARGET, id = %id, "dispatcher gone, dropping reply");
            return AssemblyOutcome::Dropped(DropReason::Detached);
        };
        let Some(inbox) = table.find(&id) else {
            debug!(target: ASSEMBLER_TARGET, id = %id, "no request waiting, dropping reply");
            return AssemblyOutcome::Dropped(DropReason::UnknownId);
        };

        let outcome = if message.is_fragmented() {
            inbox.collect_fragment(message)
        } else {
            inbox.deliver(message)
        };
        match &outcome {
            AssemblyOutcome::Dropped(DropReason::InvalidFragment(error)) => warn!(
                target: ASSEMBLER_TARGET,
                id = %id,
                error = %error,
                "dropping inconsistent reply fragment"
            ),
            AssemblyOutcome::Dropped(reason) => debug!(
                target: ASSEMBLER_TARGET,
                id = %id,
                reason = ?reason,
                "reply dropped"
            ),
            AssemblyOutcome::Delivered | AssemblyOutcome::Buffered => trace!(
                target: ASSEMBLER_TARGET,
                id = %id,
                outcome = ?outcome,
                "reply accepted"
            ),
        }
        outcome
    }

    /// Fails the waiting request; every fragment of its reply would be
    /// refused the same way.
    fn reject(&self, id: &ReplyId, error: FragmentError) {
        if let Some(inbox) = self.table.upgrade().and_then(|table| table.find(id)) {
            inbox.reject(error);
        }
    }
}

impl MessageHandler for ReplyAssembler {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        trace!(target: ASSEMBLER_TARGET, topic, "reply received");
        self.accept_bytes(payload);
    }
}
