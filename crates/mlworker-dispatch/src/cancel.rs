//! Cooperative cancellation of blocking waits.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::correlation::Inbox;

#[derive(Default)]
struct CancelState {
    cancelled: bool,
    waiter: Option<Weak<Inbox>>,
}

/// Interrupts a blocking `perform` or `block_await` from another thread.
///
/// Cancelling releases the waiting caller with
/// [`crate::DispatchError::Cancelled`]. The worker is not told; a reply that
/// arrives afterwards is dropped. A token cancelled before the wait starts
/// cancels it immediately.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<Mutex<CancelState>>,
}

impl CancelToken {
    /// Builds an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the current and any future wait using this token.
    pub fn cancel(&self) {
        let waiter = {
            let mut state = self.lock();
            state.cancelled = true;
            state.waiter.take()
        };
        if let Some(inbox) = waiter.and_then(|weak| weak.upgrade()) {
            inbox.interrupt();
        }
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Routes cancellation to `inbox` until the guard drops.
    pub(crate) fn attach(&self, inbox: &Arc<Inbox>) -> AttachGuard<'_> {
        let mut state = self.lock();
        if state.cancelled {
            inbox.interrupt();
        } else {
            state.waiter = Some(Arc::downgrade(inbox));
        }
        AttachGuard { token: self }
    }

    fn lock(&self) -> MutexGuard<'_, CancelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Detaches the token from its inbox when the wait ends.
pub(crate) struct AttachGuard<'a> {
    token: &'a CancelToken,
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        self.token.lock().waiter = None;
    }
}
