//! Topic names and subscription patterns.

use std::fmt;

use strum::Display;

use crate::worker::WorkerId;

/// Per-worker channel suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    /// Requests sent to the worker.
    Action,
    /// Configuration pushed to the worker.
    Config,
    /// Replies published by the worker.
    Reply,
}

/// A concrete topic such as `ml-worker/INTERNAL/action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// Builds `<prefix>/<worker>/<channel>`.
    #[must_use]
    pub fn new(prefix: &str, worker: WorkerId, channel: Channel) -> Self {
        Self(format!("{prefix}/{worker}/{channel}"))
    }

    /// Action topic of `worker`.
    #[must_use]
    pub fn action(prefix: &str, worker: WorkerId) -> Self {
        Self::new(prefix, worker, Channel::Action)
    }

    /// Config topic of `worker`.
    #[must_use]
    pub fn config(prefix: &str, worker: WorkerId) -> Self {
        Self::new(prefix, worker, Channel::Config)
    }

    /// Reply topic of `worker`.
    #[must_use]
    pub fn reply(prefix: &str, worker: WorkerId) -> Self {
        Self::new(prefix, worker, Channel::Reply)
    }

    /// Topic text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription pattern; `*` matches exactly one `/`-separated segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern(String);

impl TopicPattern {
    /// Wraps a raw pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Matches exactly one topic.
    #[must_use]
    pub fn exact(topic: &Topic) -> Self {
        Self(topic.0.clone())
    }

    /// Matches `channel` of every worker: `<prefix>/*/<channel>`.
    #[must_use]
    pub fn every_worker(prefix: &str, channel: Channel) -> Self {
        Self(format!("{prefix}/*/{channel}"))
    }

    /// Pattern text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns `true` when `topic` matches the pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let mut expected = self.0.split('/');
        let mut actual = topic.split('/');
        loop {
            match (expected.next(), actual.next()) {
                (None, None) => return true,
                (Some("*"), Some(_)) => {}
                (Some(want), Some(got)) if want == got => {}
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
