//! Worker identities and the configuration pushed to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Identifies one worker class.
///
/// Only one worker of each class is connected at a time, so the identity
/// doubles as the routing key in topic names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WorkerId {
    /// Worker started by the coordinator alongside itself.
    Internal,
    /// Worker started by a user and attached remotely.
    External,
}

/// Configuration keys understood by workers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum ConfigKey {
    /// Largest reply fragment body the worker may publish, in bytes.
    #[serde(rename = "MAX_STOMP_ML_WORKER_REPLY_SIZE")]
    #[strum(serialize = "MAX_STOMP_ML_WORKER_REPLY_SIZE")]
    MaxReplyPayloadBytes,
}

/// Configuration last pushed to a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    values: BTreeMap<ConfigKey, serde_json::Value>,
}

impl WorkerConfig {
    /// Returns the value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: ConfigKey) -> Option<&serde_json::Value> {
        self.values.get(&key)
    }

    /// Records `value` for `key`, replacing any previous value.
    pub fn set(&mut self, key: ConfigKey, value: serde_json::Value) {
        self.values.insert(key, value);
    }

    /// Maximum reply fragment size last pushed, if any.
    #[must_use]
    pub fn max_reply_payload_bytes(&self) -> Option<usize> {
        self.get(ConfigKey::MaxReplyPayloadBytes)
            .and_then(serde_json::Value::as_u64)
            .and_then(|bytes| usize::try_from(bytes).ok())
    }

    /// Returns `true` when nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
