//! Handler behind the coordinator's in-process `INTERNAL` worker.
//!
//! It answers the verbs that need no model runtime and reports every other
//! verb as unsupported through the worker error layout.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use mlworker_dispatch::reply::WorkerInfo;
use mlworker_dispatch::{Action, ActionHandler, WorkerOutcome};
use serde_json::json;

/// Answers `echo`, `getInfo` and `stopWorker` inside the coordinator.
#[derive(Debug, Clone)]
pub struct InternalWorker {
    started_at: u64,
}

impl Default for InternalWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl InternalWorker {
    /// Builds a handler stamped with the current time as its start time.
    #[must_use]
    pub fn new() -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self { started_at }
    }

    fn info(&self) -> WorkerInfo {
        WorkerInfo {
            platform: json!({
                "machine": std::env::consts::ARCH,
                "system": std::env::consts::OS,
                "family": std::env::consts::FAMILY,
            }),
            interpreter: String::from(env!("CARGO_PKG_NAME")),
            interpreter_version: String::from(env!("CARGO_PKG_VERSION")),
            installed_packages: BTreeMap::from([(
                String::from("mlworker-dispatch"),
                String::from(env!("CARGO_PKG_VERSION")),
            )]),
            internal_grpc_address: String::new(),
            is_remote: false,
            pid: u64::from(std::process::id()),
            process_start_time: self.started_at,
            giskard_client_version: String::new(),
        }
    }
}

impl ActionHandler for InternalWorker {
    fn handle(&self, action: Action, param: &serde_json::Value) -> WorkerOutcome {
        match action {
            Action::Echo => WorkerOutcome::json(param),
            Action::GetInfo => match serde_json::to_string(&self.info()) {
                Ok(body) => WorkerOutcome::Reply(body),
                Err(error) => WorkerOutcome::error(format!("failed to encode worker info: {error}")),
            },
            Action::StopWorker => WorkerOutcome::Reply(String::new()),
            other => {
                WorkerOutcome::error(format!("{other} is not supported by the internal worker"))
            }
        }
    }
}
