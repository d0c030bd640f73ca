//! Concurrent map from reply identifiers to waiting inboxes.

mod inbox;

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::trace;

pub use self::inbox::{Inbox, WaitError};
use crate::protocol::ReplyId;

pub(crate) const CORRELATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::correlation");

/// Errors raised by [`CorrelationTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// An inbox is already registered for the identifier.
    #[error("reply id {id} is already registered")]
    Duplicate {
        /// Conflicting identifier.
        id: ReplyId,
    },
}

/// Outstanding requests keyed by [`ReplyId`].
///
/// Lookups from the reply path and registrations from callers proceed
/// concurrently. Closing an entry removes it and closes its inbox, so late
/// replies find nothing.
#[derive(Debug)]
pub struct CorrelationTable {
    inboxes: DashMap<ReplyId, Arc<Inbox>>,
    capacity: usize,
}

impl CorrelationTable {
    /// Builds an empty table whose inboxes hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inboxes: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Registers a fresh inbox for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] when `id` is already open.
    pub fn open(&self, id: ReplyId) -> Result<Arc<Inbox>, CorrelationError> {
        match self.inboxes.entry(id) {
            Entry::Occupied(_) => Err(CorrelationError::Duplicate { id }),
            Entry::Vacant(slot) => {
                let inbox = Arc::new(Inbox::new(id, self.capacity));
                slot.insert(Arc::clone(&inbox));
                trace!(target: CORRELATION_TARGET, id = %id, "inbox opened");
                Ok(inbox)
            }
        }
    }

    /// Returns the inbox registered for `id`.
    #[must_use]
    pub fn find(&self, id: &ReplyId) -> Option<Arc<Inbox>> {
        self.inboxes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and closes the inbox for `id`. Returns `false` if absent.
    pub fn close(&self, id: &ReplyId) -> bool {
        let Some((_, inbox)) = self.inboxes.remove(id) else {
            return false;
        };
        inbox.close();
        trace!(target: CORRELATION_TARGET, id = %id, "inbox closed");
        true
    }

    /// Closes every inbox, waking all waiters.
    pub fn close_all(&self) {
        let ids: Vec<ReplyId> = self.inboxes.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close(&id);
        }
    }

    /// Returns `true` when `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &ReplyId) -> bool {
        self.inboxes.contains_key(id)
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inboxes.len()
    }

    /// Returns `true` when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inboxes.is_empty()
    }

    /// Capacity given to each inbox.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
