//! Structured health reporting for coordinator lifecycle events.

use mlworker_config::Config;
use mlworker_dispatch::WorkerId;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Receives coordinator lifecycle milestones.
///
/// The coordinator holds its reporter for its whole lifetime, so worker
/// connection changes after bootstrap are reported too.
pub trait HealthReporter: Send + Sync {
    /// Called once, before the configuration is loaded.
    fn bootstrap_starting(&self);

    /// Called with the resolved configuration once the internal worker is
    /// connected.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Called with the error of the first stage that failed.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once a worker is marked connected and told its reply size.
    fn worker_connected(&self, worker: WorkerId);

    /// Invoked once a worker is marked disconnected.
    fn worker_disconnected(&self, worker: WorkerId);
}

/// Reporter emitting one `tracing` event per milestone, tagged with an
/// `event` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds the reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting coordinator bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        let dispatch = config.dispatch();
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            topic_prefix = %dispatch.topic_prefix(),
            default_timeout_ms = u64::try_from(dispatch.default_timeout().as_millis())
                .unwrap_or(u64::MAX),
            max_reply_payload_bytes = dispatch.max_reply_payload_bytes(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "coordinator bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "coordinator bootstrap failed"
        );
    }

    fn worker_connected(&self, worker: WorkerId) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_connected",
            worker = %worker,
            "worker connected"
        );
    }

    fn worker_disconnected(&self, worker: WorkerId) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_disconnected",
            worker = %worker,
            "worker disconnected"
        );
    }
}
