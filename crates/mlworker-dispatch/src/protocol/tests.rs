//! Unit tests for the wire messages.

use rstest::rstest;
use serde_json::json;

use super::*;

fn fixed_id() -> ReplyId {
    "6f1c2a58-4b5e-4f7c-9a43-0d2e8d1f3b77"
        .parse()
        .expect("valid uuid")
}

#[rstest]
fn request_envelope_matches_worker_layout() {
    let envelope = RequestEnvelope::new(Action::Echo, fixed_id(), json!({"msg": "ping"}));

    let value = serde_json::to_value(&envelope).expect("serialise");

    assert_eq!(
        value,
        json!({
            "action": "echo",
            "id": "6f1c2a58-4b5e-4f7c-9a43-0d2e8d1f3b77",
            "param": {"msg": "ping"},
        })
    );
}

#[rstest]
fn config_envelope_carries_numeric_size() {
    let envelope = ConfigEnvelope::max_reply_payload_bytes(65_536);

    let value = serde_json::to_value(&envelope).expect("serialise");

    assert_eq!(
        value,
        json!({"config": "MAX_STOMP_ML_WORKER_REPLY_SIZE", "value": 65_536})
    );
}

#[rstest]
fn reply_without_fragment_fields_is_a_single_fragment() {
    let payload = br#"{"id":"6f1c2a58-4b5e-4f7c-9a43-0d2e8d1f3b77","type":"FINISH","body":"{}"}"#;

    let message = ReplyMessage::from_slice(payload).expect("parse");

    assert_eq!(message.id(), fixed_id());
    assert!(message.is_finish());
    assert_eq!((message.index(), message.total()), (1, 1));
    assert!(!message.is_fragmented());
}

#[rstest]
fn reply_type_uses_upper_case_tags() {
    let message = ReplyMessage::new(fixed_id(), ReplyType::Update, 2, 3, String::from("x"));

    let value = serde_json::to_value(&message).expect("serialise");

    assert_eq!(value["type"], json!("UPDATE"));
    assert_eq!(value["index"], json!(2));
    assert!(message.is_fragmented());
}

#[rstest]
#[case::not_json(b"not json".as_slice())]
#[case::bad_id(br#"{"id":"nope","type":"FINISH"}"#.as_slice())]
#[case::bad_type(br#"{"id":"6f1c2a58-4b5e-4f7c-9a43-0d2e8d1f3b77","type":"DONE"}"#.as_slice())]
fn malformed_replies_are_rejected(#[case] payload: &[u8]) {
    assert!(ReplyMessage::from_slice(payload).is_err());
}

#[rstest]
fn worker_error_body_reads_error_str() {
    let body: WorkerErrorBody =
        serde_json::from_str(r#"{"errorStr":"Model not found","detail":"trace"}"#)
            .expect("parse");

    assert_eq!(body.error_str(), "Model not found");
    assert_eq!(body.detail(), Some("trace"));
}

#[rstest]
fn reply_ids_are_unique_and_display_hyphenated() {
    let first = ReplyId::new();
    let second = ReplyId::new();

    assert_ne!(first, second);
    assert_eq!(first.to_string().len(), 36);
    assert_eq!(first.to_string().parse::<ReplyId>().expect("parse"), first);
}
