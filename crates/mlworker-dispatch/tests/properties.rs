//! Property tests for request/reply correlation over the loopback bus.

use std::sync::Arc;
use std::thread;

use mlworker_config::DispatchSettings;
use mlworker_dispatch::{
    Action, CorrelationTable, Dispatcher, LocalWorker, LoopbackBus, ReplyBody, ReplyId, WorkerId,
    WorkerOutcome,
};
use proptest::prelude::*;
use serde_json::json;

struct Harness {
    bus: Arc<LoopbackBus>,
    _worker: LocalWorker,
    dispatcher: Dispatcher,
}

fn echo_harness() -> Harness {
    let bus = Arc::new(LoopbackBus::new());
    let settings = DispatchSettings::default();
    let worker = LocalWorker::start(
        WorkerId::Internal,
        settings.topic_prefix(),
        bus.clone(),
        Arc::new(|_action: Action, param: &serde_json::Value| WorkerOutcome::json(param)),
    )
    .expect("worker");
    let dispatcher = Dispatcher::new(settings, bus.clone()).expect("dispatcher");
    dispatcher
        .on_worker_connected(WorkerId::Internal)
        .expect("connect");
    Harness {
        bus,
        _worker: worker,
        dispatcher,
    }
}

fn message() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..48).prop_map(String::from_iter)
}

fn echoed(reply: &ReplyBody) -> Option<&str> {
    match reply {
        ReplyBody::Echo(echo) => Some(echo.msg.as_str()),
        _ => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn concurrent_calls_receive_their_own_replies(
        messages in prop::collection::vec(message(), 1..8),
    ) {
        let harness = echo_harness();
        let dispatcher = &harness.dispatcher;

        let replies: Vec<_> = thread::scope(|scope| {
            let calls: Vec<_> = messages
                .iter()
                .map(|msg| {
                    scope.spawn(move || {
                        dispatcher.perform(WorkerId::Internal, Action::Echo, &json!({ "msg": msg }))
                    })
                })
                .collect();
            calls
                .into_iter()
                .map(|call| call.join().expect("caller thread"))
                .collect()
        });

        for (msg, outcome) in messages.iter().zip(&replies) {
            let reply = outcome.as_ref().expect("echo succeeds");
            prop_assert_eq!(echoed(reply), Some(msg.as_str()));
        }
        prop_assert_eq!(dispatcher.outstanding(), 0);
    }

    #[test]
    fn fragmented_replies_reassemble_exactly(msg in message(), limit in 1_usize..24) {
        let harness = echo_harness();
        harness
            .dispatcher
            .set_max_reply_payload_length(limit)
            .expect("push limit");
        harness.bus.flush().expect("flush config");

        let reply = harness
            .dispatcher
            .perform(WorkerId::Internal, Action::Echo, &json!({ "msg": msg }))
            .expect("echo succeeds");

        prop_assert_eq!(echoed(&reply), Some(msg.as_str()));
        prop_assert_eq!(harness.dispatcher.outstanding(), 0);
    }

    #[test]
    fn trigger_then_get_final_matches_perform(msg in message()) {
        let harness = echo_harness();
        let param = json!({ "msg": msg });

        let performed = harness
            .dispatcher
            .perform(WorkerId::Internal, Action::Echo, &param)
            .expect("perform");
        let id = harness
            .dispatcher
            .trigger(WorkerId::Internal, Action::Echo, &param)
            .expect("trigger");
        harness.bus.flush().expect("flush request");
        harness.bus.flush().expect("flush reply");
        let polled = harness.dispatcher.get_final(id, Action::Echo).expect("decode");

        prop_assert_eq!(polled, Some(performed));
        prop_assert!(harness.dispatcher.release(id));
        prop_assert_eq!(harness.dispatcher.outstanding(), 0);
    }

    #[test]
    fn closing_is_idempotent(entries in 1_usize..16, repeats in 1_usize..4) {
        let table = CorrelationTable::new(4);
        let ids: Vec<ReplyId> = (0..entries).map(|_| ReplyId::new()).collect();
        for id in &ids {
            table.open(*id).expect("fresh id");
        }

        for id in &ids {
            prop_assert!(table.close(id));
            for _ in 0..repeats {
                prop_assert!(!table.close(id));
            }
        }
        prop_assert!(table.is_empty());
    }
}
