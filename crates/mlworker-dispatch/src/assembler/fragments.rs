//! Partial reply buffering.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::protocol::{ReplyMessage, ReplyType};

/// A fragment that cannot belong to a well-formed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FragmentError {
    /// `total` was zero.
    #[error("fragment total must be at least 1")]
    ZeroTotal,
    /// `index` fell outside `1..=total`.
    #[error("fragment index {index} is outside 1..={total}")]
    IndexOutOfRange {
        /// Announced index.
        index: u32,
        /// Announced total.
        total: u32,
    },
    /// `total` exceeds the configured bound.
    #[error("reply announces {total} fragments but at most {max} are accepted")]
    TooManyFragments {
        /// Announced total.
        total: u32,
        /// Configured bound.
        max: u32,
    },
    /// `total` differs from earlier fragments of the same reply.
    #[error("fragment total changed from {expected} to {found}")]
    TotalMismatch {
        /// Total announced by the first fragment.
        expected: u32,
        /// Total announced by this fragment.
        found: u32,
    },
}

/// Rejects fragments whose position or count is unusable.
pub(crate) const fn check_bounds(message: &ReplyMessage, max: u32) -> Result<(), FragmentError> {
    let (index, total) = (message.index(), message.total());
    if total == 0 {
        return Err(FragmentError::ZeroTotal);
    }
    if total > max {
        return Err(FragmentError::TooManyFragments { total, max });
    }
    if index == 0 || index > total {
        return Err(FragmentError::IndexOutOfRange { index, total });
    }
    Ok(())
}

/// Result of adding a fragment to a [`FragmentBuffer`].
#[derive(Debug)]
pub(crate) enum FragmentProgress {
    Pending,
    Duplicate,
    Complete(ReplyMessage),
}

/// Fragments of one reply, keyed by index.
///
/// A buffer holds fragments of a single reply type. Once every index has
/// arrived the buffer is sealed: it keeps its parts so that redelivered
/// fragments of the finished reply can be recognised, and accepts nothing
/// further.
#[derive(Debug)]
pub(crate) struct FragmentBuffer {
    kind: ReplyType,
    total: u32,
    parts: BTreeMap<u32, ReplyMessage>,
    sealed: bool,
}

impl FragmentBuffer {
    pub(crate) const fn new(kind: ReplyType, total: u32) -> Self {
        Self {
            kind,
            total,
            parts: BTreeMap::new(),
            sealed: false,
        }
    }

    /// Returns `true` when `message` repeats a fragment already held.
    pub(crate) fn is_redelivery(&self, message: &ReplyMessage) -> bool {
        self.parts.get(&message.index()).is_some_and(|part| {
            part.kind() == message.kind()
                && part.total() == message.total()
                && part.body() == message.body()
        })
    }

    /// Returns `true` when `message` belongs to the reply being collected.
    pub(crate) fn continues(&self, message: &ReplyMessage) -> bool {
        !self.sealed && message.kind() == self.kind
    }

    /// Adds a bounds-checked fragment. Repeated indices are ignored.
    pub(crate) fn insert(
        &mut self,
        message: ReplyMessage,
    ) -> Result<FragmentProgress, FragmentError> {
        if message.total() != self.total {
            return Err(FragmentError::TotalMismatch {
                expected: self.total,
                found: message.total(),
            });
        }
        if self.sealed || self.parts.contains_key(&message.index()) {
            return Ok(FragmentProgress::Duplicate);
        }
        let id = message.id();
        self.parts.insert(message.index(), message);
        let received = u32::try_from(self.parts.len()).unwrap_or(u32::MAX);
        if received < self.total {
            return Ok(FragmentProgress::Pending);
        }
        self.sealed = true;
        let body: String = self.parts.values().map(ReplyMessage::body).collect();
        Ok(FragmentProgress::Complete(ReplyMessage::new(
            id, self.kind, 1, 1, body,
        )))
    }
}
