//! Wire messages exchanged with workers.
//!
//! Every message is a JSON object. Requests travel on a worker's action
//! topic, configuration on its config topic, and replies come back on its
//! reply topic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;
use crate::worker::ConfigKey;

/// Correlates a request with the replies it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyId(Uuid);

impl ReplyId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReplyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for ReplyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Request published on `<prefix>/<worker>/action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    action: Action,
    id: ReplyId,
    #[serde(default)]
    param: serde_json::Value,
}

impl RequestEnvelope {
    /// Builds a request for `action` correlated by `id`.
    #[must_use]
    pub const fn new(action: Action, id: ReplyId, param: serde_json::Value) -> Self {
        Self { action, id, param }
    }

    /// Requested verb.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Correlation identifier the worker must echo.
    #[must_use]
    pub const fn id(&self) -> ReplyId {
        self.id
    }

    /// Verb-specific parameter.
    #[must_use]
    pub const fn param(&self) -> &serde_json::Value {
        &self.param
    }
}

/// Configuration message published on `<prefix>/<worker>/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    config: ConfigKey,
    value: serde_json::Value,
}

impl ConfigEnvelope {
    /// Builds a configuration message.
    #[must_use]
    pub const fn new(config: ConfigKey, value: serde_json::Value) -> Self {
        Self { config, value }
    }

    /// Tells a worker the largest reply fragment it may publish.
    #[must_use]
    pub fn max_reply_payload_bytes(bytes: usize) -> Self {
        Self::new(ConfigKey::MaxReplyPayloadBytes, serde_json::Value::from(bytes))
    }

    /// Configuration key.
    #[must_use]
    pub const fn key(&self) -> ConfigKey {
        self.config
    }

    /// Configuration value.
    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

/// Whether a reply is a progress update or the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyType {
    /// Intermediate progress; more messages follow.
    Update,
    /// Terminal reply; nothing follows.
    Finish,
}

const fn single_fragment() -> u32 {
    1
}

/// One reply fragment published on `<prefix>/<worker>/reply`.
///
/// `index` is 1-based. A reply that fits in one message has
/// `index == total == 1`; workers that do not fragment may omit both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    id: ReplyId,
    #[serde(rename = "type")]
    kind: ReplyType,
    #[serde(default = "single_fragment")]
    index: u32,
    #[serde(default = "single_fragment")]
    total: u32,
    #[serde(default)]
    body: String,
}

impl ReplyMessage {
    /// Builds a fragment.
    #[must_use]
    pub const fn new(id: ReplyId, kind: ReplyType, index: u32, total: u32, body: String) -> Self {
        Self {
            id,
            kind,
            index,
            total,
            body,
        }
    }

    /// Builds an unfragmented terminal reply.
    #[must_use]
    pub fn finish(id: ReplyId, body: impl Into<String>) -> Self {
        Self::new(id, ReplyType::Finish, 1, 1, body.into())
    }

    /// Builds an unfragmented progress update.
    #[must_use]
    pub fn update(id: ReplyId, body: impl Into<String>) -> Self {
        Self::new(id, ReplyType::Update, 1, 1, body.into())
    }

    /// Parses a reply from raw transport bytes.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not a reply message.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serialises the reply for publication.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when serialisation fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Correlation identifier.
    #[must_use]
    pub const fn id(&self) -> ReplyId {
        self.id
    }

    /// Update or finish.
    #[must_use]
    pub const fn kind(&self) -> ReplyType {
        self.kind
    }

    /// 1-based fragment position.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Number of fragments in the reply.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Fragment text.
    #[must_use]
    pub const fn body(&self) -> &str {
        self.body.as_str()
    }

    /// Consumes the message, returning its body.
    #[must_use]
    pub fn into_body(self) -> String {
        self.body
    }

    /// Returns `true` for a terminal reply.
    #[must_use]
    pub const fn is_finish(&self) -> bool {
        matches!(self.kind, ReplyType::Finish)
    }

    /// Returns `true` when the reply is split across several messages.
    #[must_use]
    pub const fn is_fragmented(&self) -> bool {
        self.total > 1
    }
}

/// Body a worker sends instead of a result when the request failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerErrorBody {
    #[serde(rename = "errorStr")]
    error_str: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl WorkerErrorBody {
    /// Builds an error body.
    #[must_use]
    pub fn new(error_str: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            error_str: error_str.into(),
            detail,
        }
    }

    /// Short error description.
    #[must_use]
    pub const fn error_str(&self) -> &str {
        self.error_str.as_str()
    }

    /// Longer diagnostic, typically a remote stack trace.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Splits the body into its parts.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.error_str, self.detail)
    }
}

#[cfg(test)]
mod tests;
