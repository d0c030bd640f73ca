//! Connection state and pushed configuration for each worker.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use strum::IntoEnumIterator;
use tracing::info;

use crate::worker::{ConfigKey, WorkerConfig, WorkerId};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

#[derive(Debug, Default)]
struct WorkerEntry {
    connected: bool,
    config: WorkerConfig,
}

/// Tracks which workers are connected and what each was last told.
///
/// Every [`WorkerId`] is known from the start in the disconnected state.
/// Readers never block each other.
#[derive(Debug)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, WorkerEntry>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    /// Builds a registry with every worker disconnected.
    #[must_use]
    pub fn new() -> Self {
        let workers = WorkerId::iter()
            .map(|worker| (worker, WorkerEntry::default()))
            .collect();
        Self {
            workers: RwLock::new(workers),
        }
    }

    /// Returns `true` when `worker` is connected.
    #[must_use]
    pub fn is_connected(&self, worker: WorkerId) -> bool {
        self.read(|workers| workers.get(&worker).is_some_and(|entry| entry.connected))
    }

    /// Marks `worker` connected. Returns `false` if it already was.
    pub fn on_connect(&self, worker: WorkerId) -> bool {
        let newly_connected = self.write(|workers| {
            let entry = workers.entry(worker).or_default();
            !std::mem::replace(&mut entry.connected, true)
        });
        if newly_connected {
            info!(target: REGISTRY_TARGET, worker = %worker, "worker connected");
        }
        newly_connected
    }

    /// Marks `worker` disconnected and forgets its pushed configuration.
    /// Returns `false` if it was not connected.
    pub fn on_disconnect(&self, worker: WorkerId) -> bool {
        let was_connected = self.write(|workers| {
            let entry = workers.entry(worker).or_default();
            entry.config = WorkerConfig::default();
            std::mem::replace(&mut entry.connected, false)
        });
        if was_connected {
            info!(target: REGISTRY_TARGET, worker = %worker, "worker disconnected");
        }
        was_connected
    }

    /// Records the maximum reply size pushed to `worker`.
    pub fn set_max_reply_payload_length(&self, worker: WorkerId, bytes: usize) {
        self.write(|workers| {
            workers
                .entry(worker)
                .or_default()
                .config
                .set(ConfigKey::MaxReplyPayloadBytes, serde_json::Value::from(bytes));
        });
    }

    /// Snapshot of the configuration last pushed to `worker`.
    #[must_use]
    pub fn config(&self, worker: WorkerId) -> WorkerConfig {
        self.read(|workers| {
            workers
                .get(&worker)
                .map(|entry| entry.config.clone())
                .unwrap_or_default()
        })
    }

    /// Workers currently connected, in a stable order.
    #[must_use]
    pub fn connected_workers(&self) -> Vec<WorkerId> {
        let mut connected: Vec<WorkerId> = self.read(|workers| {
            workers
                .iter()
                .filter(|(_, entry)| entry.connected)
                .map(|(worker, _)| *worker)
                .collect()
        });
        connected.sort_unstable();
        connected
    }

    fn read<R>(&self, f: impl FnOnce(&HashMap<WorkerId, WorkerEntry>) -> R) -> R {
        let guard = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut HashMap<WorkerId, WorkerEntry>) -> R) -> R {
        let mut guard = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests;
