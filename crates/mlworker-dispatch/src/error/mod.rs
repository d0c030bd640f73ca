//! Errors surfaced to dispatcher callers.
//!
//! Each variant names one failure of a request/reply exchange and carries the
//! worker, verb and correlation id needed to trace it in the logs.

use std::time::Duration;

use thiserror::Error;

use crate::action::Action;
use crate::assembler::FragmentError;
use crate::correlation::CorrelationError;
use crate::protocol::{ReplyId, WorkerErrorBody};
use crate::reply::DecodeFailure;
use crate::transport::TransportError;
use crate::worker::WorkerId;

/// Errors raised by [`crate::Dispatcher`] operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target worker is not connected; nothing was sent.
    #[error("worker {worker} is not connected")]
    WorkerUnavailable {
        /// Requested worker.
        worker: WorkerId,
    },

    /// No terminal reply arrived before the deadline.
    #[error("{action} on worker {worker} timed out after {timeout_ms} ms (reply id {id})")]
    Timeout {
        /// Requested worker.
        worker: WorkerId,
        /// Requested verb.
        action: Action,
        /// Correlation id of the abandoned request.
        id: ReplyId,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// The wait was cancelled or the dispatcher shut down.
    #[error("wait for reply {id} was cancelled")]
    Cancelled {
        /// Correlation id of the abandoned request.
        id: ReplyId,
    },

    /// The worker answered with an error body.
    #[error("worker failed to execute {action}: {error_str}")]
    Remote {
        /// Requested verb.
        action: Action,
        /// Short error description from the worker.
        error_str: String,
        /// Longer diagnostic from the worker.
        detail: Option<String>,
    },

    /// The terminal body fit neither the verb's shape nor the error layout.
    #[error("failed to decode {action} reply: {source}")]
    Decode {
        /// Requested verb.
        action: Action,
        /// Parser error for the declared shape.
        #[source]
        source: serde_json::Error,
    },

    /// The worker's reply can never be reassembled, typically because it was
    /// split into more fragments than the assembler accepts.
    #[error("reply {id} was rejected: {source}")]
    ReplyRejected {
        /// Correlation id of the abandoned request.
        id: ReplyId,
        /// Why the fragments were refused.
        #[source]
        source: FragmentError,
    },

    /// The transport refused the request.
    #[error("failed to publish request: {0}")]
    Transport(#[from] TransportError),

    /// The request parameter could not be serialised.
    #[error("failed to encode request: {0}")]
    EncodeRequest(#[source] serde_json::Error),

    /// No outstanding request uses the identifier.
    #[error("no outstanding request with reply id {id}")]
    UnknownReply {
        /// Identifier that was looked up.
        id: ReplyId,
    },

    /// A maximum reply payload length of zero was requested.
    #[error("max reply payload length must be at least 1 byte, got {bytes}")]
    InvalidReplyLimit {
        /// Rejected length.
        bytes: usize,
    },

    /// The correlation table refused the registration.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl DispatchError {
    /// Builds the error for a worker-reported failure.
    #[must_use]
    pub fn remote(action: Action, body: WorkerErrorBody) -> Self {
        let (error_str, detail) = body.into_parts();
        Self::Remote {
            action,
            error_str,
            detail,
        }
    }

    /// Maps a decode failure for `action`.
    #[must_use]
    pub fn from_decode_failure(action: Action, failure: DecodeFailure) -> Self {
        match failure {
            DecodeFailure::Remote(body) => Self::remote(action, body),
            DecodeFailure::Malformed(source) => Self::Decode { action, source },
        }
    }

    /// Builds a timeout error, saturating the millisecond count.
    #[must_use]
    pub fn timeout(worker: WorkerId, action: Action, id: ReplyId, timeout: Duration) -> Self {
        Self::Timeout {
            worker,
            action,
            id,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns `true` when retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WorkerUnavailable { .. } | Self::Timeout { .. } | Self::Transport(_)
        )
    }

    /// Process exit status for command-line callers.
    ///
    /// Worker-side failures return 1. Connectivity problems return 2.
    /// Local faults return 3.
    #[must_use]
    pub const fn exit_status(&self) -> u8 {
        match self {
            Self::Remote { .. } | Self::Decode { .. } | Self::ReplyRejected { .. } => 1,
            Self::WorkerUnavailable { .. }
            | Self::Timeout { .. }
            | Self::Transport(_)
            | Self::Cancelled { .. } => 2,
            Self::EncodeRequest(_)
            | Self::UnknownReply { .. }
            | Self::InvalidReplyLimit { .. }
            | Self::Correlation(_) => 3,
        }
    }
}
