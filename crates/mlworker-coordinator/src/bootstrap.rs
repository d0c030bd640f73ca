//! Coordinator bootstrap orchestration.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use mlworker_config::{Config, ConfigError};
use mlworker_dispatch::reply::WorkerInfo;
use mlworker_dispatch::{
    Action, DispatchError, Dispatcher, LocalWorker, LoopbackBus, ReplyBody, TransportError,
    WorkerId,
};
use serde_json::json;
use thiserror::Error;

use crate::health::HealthReporter;
use crate::internal_worker::InternalWorker;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the coordinator configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source cannot be read, parsed or
    /// validated.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader resolving configuration through `ortho_config`.
///
/// Defaults, the configuration file, `MLWORKER_*` variables and the stored
/// flags are merged in that order of precedence.
#[derive(Debug, Clone)]
pub struct OrthoConfigLoader {
    args: Vec<OsString>,
}

impl OrthoConfigLoader {
    /// Builds a loader for `args`: the program name followed by configuration
    /// flags only.
    #[must_use]
    pub const fn new(args: Vec<OsString>) -> Self {
        Self { args }
    }

    /// Flags handed to `ortho_config`, program name first.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_validated(&self.args)
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The in-process worker could not subscribe.
    #[error("failed to start the internal worker: {source}")]
    Worker {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// The dispatcher could not subscribe or reach the internal worker.
    #[error("failed to start the dispatcher: {source}")]
    Dispatcher {
        /// Underlying dispatch error.
        #[source]
        source: DispatchError,
    },
}

/// Result of a successful bootstrap: a dispatcher wired to the in-process
/// worker over a loopback bus.
pub struct Coordinator {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    dispatcher: Dispatcher,
    worker: LocalWorker,
    bus: Arc<LoopbackBus>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher bound to the loopback bus.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Round-trips `message` through `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the call fails.
    pub fn echo(
        &self,
        worker: WorkerId,
        message: &str,
        timeout: Option<Duration>,
    ) -> Result<String, DispatchError> {
        let reply = self.call(worker, Action::Echo, &json!({ "msg": message }), timeout)?;
        match reply {
            ReplyBody::Echo(echo) => Ok(echo.msg),
            other => Err(unexpected_shape(Action::Echo, &other)),
        }
    }

    /// Asks `worker` to describe itself.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the call fails.
    pub fn info(
        &self,
        worker: WorkerId,
        timeout: Option<Duration>,
    ) -> Result<WorkerInfo, DispatchError> {
        let reply = self.call(worker, Action::GetInfo, &json!({}), timeout)?;
        match reply {
            ReplyBody::WorkerInfo(info) => Ok(info),
            other => Err(unexpected_shape(Action::GetInfo, &other)),
        }
    }

    /// Marks `worker` connected, pushes its reply size and reports it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when the configuration push
    /// fails.
    pub fn connect_worker(&self, worker: WorkerId) -> Result<(), DispatchError> {
        self.dispatcher.on_worker_connected(worker)?;
        self.reporter.worker_connected(worker);
        Ok(())
    }

    /// Marks `worker` disconnected and reports it.
    pub fn disconnect_worker(&self, worker: WorkerId) {
        self.dispatcher.on_worker_disconnected(worker);
        self.reporter.worker_disconnected(worker);
    }

    /// Releases every waiter, detaches the internal worker and stops the bus.
    pub fn shutdown(&mut self) {
        self.disconnect_worker(WorkerId::Internal);
        self.dispatcher.shutdown();
        self.worker.stop();
        self.bus.shutdown();
    }

    fn call(
        &self,
        worker: WorkerId,
        action: Action,
        param: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<ReplyBody, DispatchError> {
        match timeout {
            Some(limit) => self
                .dispatcher
                .perform_with_timeout(worker, action, param, limit),
            None => self.dispatcher.perform(worker, action, param),
        }
    }
}

fn unexpected_shape(action: Action, reply: &ReplyBody) -> DispatchError {
    DispatchError::Remote {
        action,
        error_str: format!("unexpected {} reply", reply.shape()),
        detail: None,
    }
}

/// Bootstraps the coordinator using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first stage that fails; the reporter
/// has already been told.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Coordinator, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, Arc::clone(&reporter)) {
        Ok(coordinator) => {
            reporter.bootstrap_succeeded(&coordinator.config);
            Ok(coordinator)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Coordinator, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let bus = Arc::new(LoopbackBus::new());
    let settings = config.dispatch();
    let worker = LocalWorker::start(
        WorkerId::Internal,
        settings.topic_prefix(),
        bus.clone(),
        Arc::new(InternalWorker::new()),
    )
    .map_err(|source| BootstrapError::Worker { source })?;
    let dispatcher = Dispatcher::new(settings, bus.clone())
        .map_err(|source| BootstrapError::Dispatcher { source })?;

    let coordinator = Coordinator {
        config,
        telemetry,
        reporter,
        dispatcher,
        worker,
        bus,
    };
    coordinator
        .connect_worker(WorkerId::Internal)
        .map_err(|source| BootstrapError::Dispatcher { source })?;
    Ok(coordinator)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use mlworker_config::LogFormat;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("temp dir")
    }

    fn loader_for(flags: &[&str]) -> OrthoConfigLoader {
        let args = std::iter::once("mlworker-coordinator")
            .chain(flags.iter().copied())
            .map(OsString::from)
            .collect();
        OrthoConfigLoader::new(args)
    }

    #[rstest]
    fn flags_override_the_configuration_file(temp_dir: TempDir) {
        let path = temp_dir.path().join("coordinator.toml");
        fs::write(
            &path,
            "log_filter = \"warn\"\nlog_format = \"compact\"\ndefault_timeout_ms = 250\n",
        )
        .expect("write config");
        let config_path = path.to_string_lossy().into_owned();

        let config = loader_for(&["--config-path", &config_path, "--log-filter", "debug"])
            .load()
            .expect("load");

        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(
            config.dispatch().default_timeout(),
            Duration::from_millis(250)
        );
    }

    #[rstest]
    fn malformed_file_is_a_load_error(temp_dir: TempDir) {
        let path = temp_dir.path().join("coordinator.toml");
        fs::write(&path, "log_filter = [").expect("write config");
        let config_path = path.to_string_lossy().into_owned();

        let error = loader_for(&["--config-path", &config_path])
            .load()
            .expect_err("malformed file");

        assert!(matches!(error, ConfigError::Load(_)), "unexpected error: {error:?}");
    }

    #[rstest]
    fn blank_filter_flag_fails_validation() {
        let error = loader_for(&["--log-filter", "  "])
            .load()
            .expect_err("blank filter");

        assert!(matches!(error, ConfigError::Invalid { field: "log_filter", .. }));
    }

    #[rstest]
    fn static_loader_validates_its_config() {
        let loader = StaticConfigLoader::new(Config::default().with_log_filter(""));

        let error = loader.load().expect_err("empty filter");

        assert!(matches!(error, ConfigError::Invalid { field: "log_filter", .. }));
    }
}
