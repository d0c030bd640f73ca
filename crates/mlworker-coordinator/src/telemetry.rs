//! Process-wide `tracing` subscriber for the coordinator.
//!
//! Output goes to stderr so stdout stays reserved for command results. The
//! dispatcher's message-routing targets log once per reply fragment, so they
//! are held at `warn` unless the configured filter names them.

use std::io::{self, IsTerminal};

use mlworker_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Targets logging per message, with the level they default to.
const ROUTING_TARGETS: &[(&str, &str)] = &[
    ("mlworker_dispatch::assembler", "warn"),
    ("mlworker_dispatch::transport", "warn"),
    ("mlworker_dispatch::correlation", "warn"),
];

/// Proof that the process-wide subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Reasons the tracing subscriber could not be installed.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression does not parse.
    #[error("log filter does not parse: {0}")]
    Filter(String),
    /// The tracing subscriber could not be installed.
    #[error("another tracing subscriber is already installed: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on the first call.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// global state, even when their configuration differs.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the first configuration carries
/// an invalid filter and [`TelemetryError::Subscriber`] when another
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|()| TelemetryHandle)
}

/// Appends a directive for every routing target `configured` leaves unnamed.
pub(crate) fn filter_expression(configured: &str) -> String {
    let named: Vec<&str> = configured
        .split(',')
        .filter_map(|directive| directive.split('=').next())
        .map(str::trim)
        .collect();
    ROUTING_TARGETS
        .iter()
        .filter(|(target, _)| !named.contains(target))
        .fold(configured.trim().to_owned(), |mut expression, (target, level)| {
            expression.push_str(&format!(",{target}={level}"));
            expression
        })
}

pub(crate) fn parse_filter(configured: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter_expression(configured))
        .map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config.log_filter())?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
