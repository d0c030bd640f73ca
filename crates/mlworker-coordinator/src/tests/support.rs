//! Shared fixtures for coordinator tests.

use std::sync::{Arc, Mutex};

use mlworker_config::{Config, ConfigError};
use mlworker_dispatch::{DispatchError, WorkerId};
use mockall::mock;

use crate::{BootstrapError, ConfigLoader, Coordinator, HealthReporter, bootstrap_with};

mock! {
    pub Loader {}
    impl ConfigLoader for Loader {
        fn load(&self) -> Result<Config, ConfigError>;
    }
}

/// Lifecycle event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    WorkerConnected(WorkerId),
    WorkerDisconnected(WorkerId),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("events lock").clone()
    }

    fn push(&self, event: HealthEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl HealthReporter for RecordingReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.push(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn worker_connected(&self, worker: WorkerId) {
        self.push(HealthEvent::WorkerConnected(worker));
    }

    fn worker_disconnected(&self, worker: WorkerId) {
        self.push(HealthEvent::WorkerDisconnected(worker));
    }
}

pub(crate) fn healthy_loader() -> MockLoader {
    let mut loader = MockLoader::new();
    loader
        .expect_load()
        .returning(|| Ok(Config::default().with_log_filter("warn")));
    loader
}

pub(crate) fn failing_loader() -> MockLoader {
    let mut loader = MockLoader::new();
    loader.expect_load().times(1).returning(|| {
        Err(ConfigError::Invalid {
            field: "inbox_capacity",
            message: String::from("must be greater than zero"),
        })
    });
    loader
}

/// State threaded through the steps of one bootstrap scenario.
pub(crate) struct TestWorld {
    loader: Option<MockLoader>,
    pub(crate) reporter: Arc<RecordingReporter>,
    pub(crate) coordinator: Option<Coordinator>,
    pub(crate) bootstrap_error: Option<BootstrapError>,
    pub(crate) echo: Option<Result<String, DispatchError>>,
}

impl TestWorld {
    pub(crate) fn use_loader(&mut self, loader: MockLoader) {
        self.loader = Some(loader);
    }

    pub(crate) fn bootstrap(&mut self) {
        let loader = self.loader.take().expect("a loader was configured");
        match bootstrap_with(&loader, self.reporter.clone()) {
            Ok(coordinator) => self.coordinator = Some(coordinator),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    pub(crate) fn coordinator(&self) -> &Coordinator {
        self.coordinator
            .as_ref()
            .expect("bootstrap produced a coordinator")
    }
}

pub(crate) fn world() -> TestWorld {
    TestWorld {
        loader: None,
        reporter: Arc::new(RecordingReporter::default()),
        coordinator: None,
        bootstrap_error: None,
        echo: None,
    }
}
