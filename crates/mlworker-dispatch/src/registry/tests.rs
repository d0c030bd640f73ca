//! Unit tests for the worker registry.

use std::sync::Arc;
use std::thread;

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn registry() -> WorkerRegistry {
    WorkerRegistry::new()
}

#[rstest]
fn workers_start_disconnected(registry: WorkerRegistry) {
    assert!(!registry.is_connected(WorkerId::Internal));
    assert!(!registry.is_connected(WorkerId::External));
    assert!(registry.connected_workers().is_empty());
}

#[rstest]
fn connect_is_reported_once(registry: WorkerRegistry) {
    assert!(registry.on_connect(WorkerId::External));
    assert!(!registry.on_connect(WorkerId::External));
    assert!(registry.is_connected(WorkerId::External));
    assert_eq!(registry.connected_workers(), vec![WorkerId::External]);
}

#[rstest]
fn disconnect_forgets_pushed_configuration(registry: WorkerRegistry) {
    registry.on_connect(WorkerId::Internal);
    registry.set_max_reply_payload_length(WorkerId::Internal, 1024);
    assert_eq!(
        registry.config(WorkerId::Internal).max_reply_payload_bytes(),
        Some(1024)
    );

    assert!(registry.on_disconnect(WorkerId::Internal));
    assert!(!registry.on_disconnect(WorkerId::Internal));

    assert!(!registry.is_connected(WorkerId::Internal));
    assert!(registry.config(WorkerId::Internal).is_empty());
}

#[rstest]
fn connected_workers_are_sorted(registry: WorkerRegistry) {
    registry.on_connect(WorkerId::External);
    registry.on_connect(WorkerId::Internal);

    assert_eq!(
        registry.connected_workers(),
        vec![WorkerId::Internal, WorkerId::External]
    );
}

#[rstest]
fn concurrent_readers_observe_connection(registry: WorkerRegistry) {
    let shared = Arc::new(registry);
    shared.on_connect(WorkerId::Internal);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = Arc::clone(&shared);
            thread::spawn(move || reader.is_connected(WorkerId::Internal))
        })
        .collect();

    for reader in readers {
        assert!(reader.join().expect("reader thread"));
    }
}
