//! Tunables for the request/reply dispatcher.

use std::time::Duration;

use crate::defaults::{
    default_inbox_capacity, default_max_fragments, default_max_reply_payload_bytes,
    default_timeout_ms, default_topic_prefix,
};

/// Settings consumed by the dispatcher, the reply assembler and the
/// correlation table.
///
/// Built from [`crate::Config::dispatch`] or directly by embedders and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    topic_prefix: String,
    default_timeout_ms: u64,
    inbox_capacity: usize,
    max_reply_payload_bytes: usize,
    max_fragments: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            default_timeout_ms: default_timeout_ms(),
            inbox_capacity: default_inbox_capacity(),
            max_reply_payload_bytes: default_max_reply_payload_bytes(),
            max_fragments: default_max_fragments(),
        }
    }
}

impl DispatchSettings {
    /// Prefix of every worker topic, e.g. `ml-worker`.
    #[must_use]
    pub const fn topic_prefix(&self) -> &str {
        self.topic_prefix.as_str()
    }

    /// Deadline applied by `perform` when the caller does not supply one.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Maximum number of messages buffered per inbox.
    #[must_use]
    pub const fn inbox_capacity(&self) -> usize {
        self.inbox_capacity
    }

    /// Largest reply fragment body advertised to workers.
    #[must_use]
    pub const fn max_reply_payload_bytes(&self) -> usize {
        self.max_reply_payload_bytes
    }

    /// Largest fragment count accepted for a single reply.
    #[must_use]
    pub const fn max_fragments(&self) -> u32 {
        self.max_fragments
    }

    /// Overrides the topic prefix.
    #[must_use]
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Overrides the default call deadline.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Overrides the inbox capacity.
    #[must_use]
    pub const fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Overrides the advertised maximum reply fragment size.
    #[must_use]
    pub const fn with_max_reply_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_reply_payload_bytes = bytes;
        self
    }

    /// Overrides the fragment count bound.
    #[must_use]
    pub const fn with_max_fragments(mut self, fragments: u32) -> Self {
        self.max_fragments = fragments;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), crate::ConfigError> {
        if self.topic_prefix.trim().is_empty() {
            return Err(crate::ConfigError::invalid(
                "topic_prefix",
                "must not be empty",
            ));
        }
        if self.topic_prefix.contains('*') {
            return Err(crate::ConfigError::invalid(
                "topic_prefix",
                "must not contain wildcards",
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(crate::ConfigError::invalid(
                "inbox_capacity",
                "must be at least 1",
            ));
        }
        if self.max_reply_payload_bytes == 0 {
            return Err(crate::ConfigError::invalid(
                "max_reply_payload_bytes",
                "must be at least 1",
            ));
        }
        if self.max_fragments == 0 {
            return Err(crate::ConfigError::invalid(
                "max_fragments",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
