//! Shared world for the dispatcher scenarios.
//!
//! A scripted responder stands in for the worker so that scenarios control
//! exactly which fragments arrive and when.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mlworker_config::DispatchSettings;
use serde_json::json;

use crate::action::Action;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::protocol::{ReplyId, ReplyMessage, ReplyType, RequestEnvelope};
use crate::reply::ReplyBody;
use crate::transport::{Channel, LoopbackBus, MessageTransport, Topic, TopicPattern};
use crate::worker::WorkerId;

const PREFIX: &str = "ml-worker";

/// How the scripted worker answers each request.
#[derive(Debug, Clone, Default)]
pub(super) enum Script {
    #[default]
    Silent,
    Echo,
    Fail(&'static str),
    Fragments(Vec<&'static str>),
}

#[derive(Default)]
struct Responder {
    script: Mutex<Script>,
    requests: Mutex<Vec<RequestEnvelope>>,
    bus: Mutex<Weak<LoopbackBus>>,
}

impl Responder {
    fn on_request(&self, payload: &[u8]) {
        let request: RequestEnvelope =
            serde_json::from_slice(payload).expect("dispatcher publishes valid requests");
        let id = request.id();
        let reply_body = request.param().to_string();
        self.requests.lock().expect("requests lock").push(request);
        let script = self.script.lock().expect("script lock").clone();
        match script {
            Script::Silent => {}
            Script::Echo => self.publish(&[ReplyMessage::finish(id, reply_body)]),
            Script::Fail(error) => {
                self.publish(&[ReplyMessage::finish(id, json!({ "errorStr": error }).to_string())]);
            }
            Script::Fragments(parts) => {
                let total = u32::try_from(parts.len()).expect("few fragments");
                let messages: Vec<_> = (1..=total)
                    .zip(parts)
                    .map(|(index, part)| {
                        ReplyMessage::new(id, ReplyType::Finish, index, total, part.to_owned())
                    })
                    .collect();
                self.publish(&messages);
            }
        }
    }

    fn publish(&self, messages: &[ReplyMessage]) {
        let Some(bus) = self.bus.lock().expect("bus lock").upgrade() else {
            return;
        };
        let topic = Topic::reply(PREFIX, WorkerId::Internal);
        for message in messages {
            bus.publish(&topic, message.to_vec().expect("encode reply"))
                .expect("publish reply");
        }
    }
}

/// State threaded through the steps of one scenario.
pub(super) struct TestWorld {
    bus: Arc<LoopbackBus>,
    responder: Arc<Responder>,
    pub(super) dispatcher: Dispatcher,
    pub(super) outcome: Option<Result<ReplyBody, DispatchError>>,
    pub(super) triggered: Option<ReplyId>,
}

impl TestWorld {
    fn new() -> Self {
        let bus = Arc::new(LoopbackBus::new());
        let responder = Arc::new(Responder::default());
        *responder.bus.lock().expect("bus lock") = Arc::downgrade(&bus);
        let handler = Arc::clone(&responder);
        bus.subscribe(
            TopicPattern::every_worker(PREFIX, Channel::Action),
            Arc::new(move |_topic: &str, payload: &[u8]| handler.on_request(payload)),
        )
        .expect("subscribe responder");
        let dispatcher = Dispatcher::new(
            DispatchSettings::default().with_default_timeout(Duration::from_secs(5)),
            bus.clone(),
        )
        .expect("dispatcher");
        Self {
            bus,
            responder,
            dispatcher,
            outcome: None,
            triggered: None,
        }
    }

    pub(super) fn script(&self, script: Script) {
        *self.responder.script.lock().expect("script lock") = script;
    }

    /// Waits until every request and the replies it caused were delivered.
    pub(super) fn settle(&self) {
        self.bus.flush().expect("flush requests");
        self.bus.flush().expect("flush replies");
    }

    pub(super) fn request_count(&self) -> usize {
        self.responder.requests.lock().expect("requests lock").len()
    }

    pub(super) fn last_request(&self) -> (Action, ReplyId) {
        let requests = self.responder.requests.lock().expect("requests lock");
        let request = requests.last().expect("a request was published");
        (request.action(), request.id())
    }

    /// Publishes a completion-only terminal reply for the last request.
    pub(super) fn answer_last_request(&self) {
        let (_, id) = self.last_request();
        self.responder.publish(&[ReplyMessage::finish(id, "")]);
        self.settle();
    }

    pub(super) fn record(&mut self, outcome: Result<ReplyBody, DispatchError>) {
        self.outcome = Some(outcome);
    }
}

pub(super) fn world() -> TestWorld {
    TestWorld::new()
}
