//! Shared configuration for the ML worker coordinator.
//!
//! The [`Config`] type gathers the dispatcher tunables and the logging
//! settings used by the coordinator binary. It is resolved by `ortho_config`
//! from, in increasing precedence: built-in defaults, a TOML file, `MLWORKER_*`
//! environment variables and command-line flags. The file is named with
//! `--config-path` or `MLWORKER_CONFIG_PATH`, otherwise `.mlworker.toml` is
//! discovered in the usual locations.
//!
//! ```toml
//! log_filter = "mlworker_dispatch=debug"
//! log_format = "compact"
//! default_timeout_ms = 2000
//! max_reply_payload_bytes = 65536
//! ```

mod defaults;
mod dispatch;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{
    default_inbox_capacity, default_max_fragments, default_max_reply_payload_bytes,
    default_timeout_ms, default_topic_prefix,
};
pub use defaults::{
    DEFAULT_INBOX_CAPACITY, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAGMENTS,
    DEFAULT_MAX_REPLY_PAYLOAD_BYTES, DEFAULT_TIMEOUT_MS, DEFAULT_TOPIC_PREFIX, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use dispatch::DispatchSettings;
pub use logging::{LogFormat, LogFormatParseError};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or merged: an unreadable or malformed file,
    /// an unparsable environment variable or an unknown flag.
    #[error(transparent)]
    Load(#[from] Arc<OrthoError>),

    /// A value parsed but is outside its accepted range.
    #[error("invalid value for '{field}': {message}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Resolved coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "MLWORKER")]
pub struct Config {
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    log_filter: String,
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    log_format: LogFormat,
    #[serde(default = "default_topic_prefix")]
    #[ortho_config(default = default_topic_prefix())]
    topic_prefix: String,
    #[serde(default = "default_timeout_ms")]
    #[ortho_config(default = default_timeout_ms())]
    default_timeout_ms: u64,
    #[serde(default = "default_inbox_capacity")]
    #[ortho_config(default = default_inbox_capacity())]
    inbox_capacity: usize,
    #[serde(default = "default_max_reply_payload_bytes")]
    #[ortho_config(default = default_max_reply_payload_bytes())]
    max_reply_payload_bytes: usize,
    #[serde(default = "default_max_fragments")]
    #[ortho_config(default = default_max_fragments())]
    max_fragments: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            topic_prefix: default_topic_prefix(),
            default_timeout_ms: default_timeout_ms(),
            inbox_capacity: default_inbox_capacity(),
            max_reply_payload_bytes: default_max_reply_payload_bytes(),
            max_fragments: default_max_fragments(),
        }
    }
}

impl Config {
    /// Merges every configuration source and validates the result.
    ///
    /// `args` starts with the program name and carries only configuration
    /// flags (`--config-path`, `--log-filter`, `--log-format`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a source cannot be read or merged
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn load_validated(args: &[OsString]) -> Result<Self, ConfigError> {
        let config = Self::load_from_iter(args.iter().cloned())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter", "must not be empty"));
        }
        self.dispatch().validate()
    }

    /// Tracing filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Dispatcher tunables.
    #[must_use]
    pub fn dispatch(&self) -> DispatchSettings {
        DispatchSettings::default()
            .with_topic_prefix(self.topic_prefix.clone())
            .with_default_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_inbox_capacity(self.inbox_capacity)
            .with_max_reply_payload_bytes(self.max_reply_payload_bytes)
            .with_max_fragments(self.max_fragments)
    }

    /// Replaces the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Replaces the dispatcher tunables.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: &DispatchSettings) -> Self {
        self.topic_prefix = dispatch.topic_prefix().to_owned();
        self.default_timeout_ms =
            u64::try_from(dispatch.default_timeout().as_millis()).unwrap_or(u64::MAX);
        self.inbox_capacity = dispatch.inbox_capacity();
        self.max_reply_payload_bytes = dispatch.max_reply_payload_bytes();
        self.max_fragments = dispatch.max_fragments();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.dispatch(), DispatchSettings::default());
        assert_eq!(
            config.dispatch().default_timeout(),
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        );
    }

    #[rstest]
    fn dispatch_settings_round_trip_through_config() {
        let settings = DispatchSettings::default()
            .with_topic_prefix("workers")
            .with_default_timeout(Duration::from_millis(250))
            .with_inbox_capacity(4)
            .with_max_reply_payload_bytes(1_024)
            .with_max_fragments(8);

        let config = Config::default().with_dispatch(&settings);

        assert_eq!(config.dispatch(), settings);
    }

    #[rstest]
    #[case::capacity(DispatchSettings::default().with_inbox_capacity(0), "inbox_capacity")]
    #[case::payload(
        DispatchSettings::default().with_max_reply_payload_bytes(0),
        "max_reply_payload_bytes"
    )]
    #[case::fragments(DispatchSettings::default().with_max_fragments(0), "max_fragments")]
    #[case::prefix(DispatchSettings::default().with_topic_prefix("  "), "topic_prefix")]
    #[case::wildcard(DispatchSettings::default().with_topic_prefix("a/*"), "topic_prefix")]
    fn rejects_out_of_range_dispatch_values(
        #[case] settings: DispatchSettings,
        #[case] expected_field: &str,
    ) {
        let error = Config::default()
            .with_dispatch(&settings)
            .validate()
            .expect_err("value should be rejected");

        match error {
            ConfigError::Invalid { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected Invalid error, got {other:?}"),
        }
    }

    #[rstest]
    fn rejects_blank_log_filter() {
        let error = Config::default()
            .with_log_filter(" ")
            .validate()
            .expect_err("blank filter");

        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "log_filter",
                ..
            }
        ));
    }
}
