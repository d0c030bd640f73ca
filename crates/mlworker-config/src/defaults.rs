/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Topic prefix shared by every ML worker channel.
pub const DEFAULT_TOPIC_PREFIX: &str = "ml-worker";

/// Deadline applied to synchronous calls when the caller does not pick one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Number of reply messages an inbox holds before evicting progress updates.
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// Largest single reply fragment the coordinator accepts (8 MiB).
pub const DEFAULT_MAX_REPLY_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on the fragment count a worker may announce for one reply.
pub const DEFAULT_MAX_FRAGMENTS: u32 = 4_096;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

pub(crate) fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_owned()
}

pub(crate) const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

pub(crate) const fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

pub(crate) const fn default_max_reply_payload_bytes() -> usize {
    DEFAULT_MAX_REPLY_PAYLOAD_BYTES
}

pub(crate) const fn default_max_fragments() -> u32 {
    DEFAULT_MAX_FRAGMENTS
}
