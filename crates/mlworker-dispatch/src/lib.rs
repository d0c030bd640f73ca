//! Request/reply dispatch between the coordinator and its ML workers.
//!
//! Workers and the coordinator only share a publish/subscribe fabric. This
//! crate layers a half-duplex RPC on top of it: the [`Dispatcher`] publishes
//! a [`RequestEnvelope`] on a worker's action topic, the worker streams
//! [`ReplyMessage`] fragments back on its reply topic, and the
//! [`ReplyAssembler`] stitches those fragments together and hands the terminal
//! reply to the inbox the caller is waiting on.
//!
//! # Architecture
//!
//! - [`transport`]: the injected [`MessageTransport`] capability plus an
//!   in-process [`LoopbackBus`].
//! - [`registry`]: which workers are connected and what each was told about
//!   reply sizes.
//! - [`correlation`]: the concurrent `ReplyId → Inbox` table.
//! - [`assembler`]: fragment reassembly and inbox delivery.
//! - [`dispatcher`]: `perform`, `trigger`, polling, and configuration push.
//! - [`reply`]: the verb-to-shape decode table.
//! - [`local_worker`]: an in-process worker that answers over any transport.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mlworker_config::DispatchSettings;
//! use mlworker_dispatch::{
//!     Action, Dispatcher, LocalWorker, LoopbackBus, ReplyBody, WorkerId, WorkerOutcome,
//! };
//!
//! let bus = Arc::new(LoopbackBus::new());
//! let settings = DispatchSettings::default();
//! let _worker = LocalWorker::start(
//!     WorkerId::Internal,
//!     settings.topic_prefix(),
//!     bus.clone(),
//!     Arc::new(|_action: Action, param: &serde_json::Value| {
//!         WorkerOutcome::Reply(param.to_string())
//!     }),
//! )
//! .expect("worker subscribes");
//!
//! let dispatcher = Dispatcher::new(settings, bus).expect("dispatcher subscribes");
//! dispatcher
//!     .on_worker_connected(WorkerId::Internal)
//!     .expect("config push succeeds");
//!
//! let reply = dispatcher
//!     .perform_with_timeout(
//!         WorkerId::Internal,
//!         Action::Echo,
//!         &serde_json::json!({"msg": "hi"}),
//!         Duration::from_secs(1),
//!     )
//!     .expect("echo succeeds");
//! match reply {
//!     ReplyBody::Echo(echo) => assert_eq!(echo.msg, "hi"),
//!     other => panic!("unexpected reply {other:?}"),
//! }
//! ```

pub mod action;
pub mod assembler;
pub mod cancel;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod local_worker;
pub mod protocol;
pub mod registry;
pub mod reply;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod tests;

pub use self::action::{Action, ReplyShape};
pub use self::assembler::{AssemblyOutcome, DropReason, FragmentError, ReplyAssembler};
pub use self::cancel::CancelToken;
pub use self::correlation::{CorrelationError, CorrelationTable, Inbox, WaitError};
pub use self::dispatcher::Dispatcher;
pub use self::error::DispatchError;
pub use self::local_worker::{ActionHandler, LocalWorker, WorkerOutcome};
pub use self::protocol::{
    ConfigEnvelope, ReplyId, ReplyMessage, ReplyType, RequestEnvelope, WorkerErrorBody,
};
pub use self::registry::WorkerRegistry;
pub use self::reply::ReplyBody;
pub use self::transport::{
    LoopbackBus, MessageHandler, MessageTransport, SubscriptionId, Topic, TopicPattern,
    TransportError,
};
pub use self::worker::{ConfigKey, WorkerConfig, WorkerId};
