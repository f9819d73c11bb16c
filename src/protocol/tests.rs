use super::*;
use crate::entity::{EntityId, Superhero};
use serde_json::json;

#[test]
fn test_frame_uses_ref_on_the_wire() {
    let frame = Frame::new("superheroes:lobby", PHX_JOIN, json!({}))
        .with_ref("1")
        .with_join_ref(Some("1".to_string()));

    let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
    assert_eq!(value["ref"], json!("1"));
    assert_eq!(value["join_ref"], json!("1"));
    assert_eq!(value["topic"], json!("superheroes:lobby"));
}

#[test]
fn test_frame_without_refs_decodes() {
    let frame = Frame::from_json(r#"{"topic":"t","event":"e","payload":{}}"#).unwrap();
    assert_eq!(frame.msg_ref, None);
    assert_eq!(frame.join_ref, None);
}

#[test]
fn test_malformed_frame_rejected() {
    assert!(matches!(
        Frame::from_json("not json"),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_hydrate_accepts_superheroes_key() {
    let frame = Frame::new(
        "superheroes:lobby",
        "hydrate",
        json!({
            "superheroes": [{"id": 1, "name": "A", "location": "X", "power": "Y"}],
            "message_id": "m1"
        }),
    );

    match ServerEvent::from_frame(frame).unwrap() {
        ServerEvent::Hydrate(payload) => {
            assert_eq!(payload.entities.len(), 1);
            assert_eq!(payload.entities[0].id, EntityId::Int(1));
            assert_eq!(payload.message_id, "m1");
        }
        other => panic!("Expected hydrate, got {:?}", other),
    }
}

#[test]
fn test_hydrate_serializes_entities_key() {
    let event = ServerEvent::Hydrate(HydratePayload {
        entities: vec![Superhero::new(1, "A", "X", "Y")],
        message_id: "m1".to_string(),
    });

    let frame = event.to_frame("superheroes:lobby").unwrap();
    assert_eq!(frame.event, "hydrate");
    assert!(frame.payload.get("entities").is_some());
}

#[test]
fn test_delete_with_only_id() {
    let frame = Frame::new(
        "superheroes:lobby",
        "delete",
        json!({"superhero": {"id": 99}, "message_id": "m3"}),
    );

    let envelope = ServerEvent::from_frame(frame)
        .unwrap()
        .into_sync_envelope()
        .unwrap();
    assert_eq!(envelope.message_id(), "m3");
    match envelope {
        SyncEnvelope::Mutation { operation, payload } => {
            assert_eq!(operation, Operation::Delete);
            assert_eq!(payload.superhero.id, EntityId::Int(99));
        }
        other => panic!("Expected mutation, got {:?}", other),
    }
}

#[test]
fn test_unknown_server_event() {
    let frame = Frame::new("superheroes:lobby", "explode", json!({}));
    assert_eq!(
        ServerEvent::from_frame(frame),
        Err(ProtocolError::UnknownEvent("explode".to_string()))
    );
}

#[test]
fn test_invalid_payload_names_event() {
    let frame = Frame::new("superheroes:lobby", "create", json!({"message_id": "m1"}));
    match ServerEvent::from_frame(frame) {
        Err(ProtocolError::InvalidPayload { event, .. }) => assert_eq!(event, "create"),
        other => panic!("Expected invalid payload, got {:?}", other),
    }
}

#[test]
fn test_ack_wire_shape() {
    let frame = ClientEvent::MessageAck(AckPayload::received("m7"))
        .to_frame("superheroes:lobby")
        .unwrap();

    assert_eq!(frame.event, "message_ack");
    assert_eq!(frame.payload, json!({"message_id": "m7", "status": "Received"}));
}

#[test]
fn test_notify_direct_decodes() {
    let frame = Frame::new(
        "notifications:lobby",
        "notify_direct",
        json!({"body": "hello", "recipient": "bob"}),
    );

    assert_eq!(
        ClientEvent::from_frame(frame).unwrap(),
        ClientEvent::NotifyDirect(DirectPayload {
            body: "hello".to_string(),
            recipient: "bob".to_string(),
        })
    );
}

#[test]
fn test_reply_echoes_request_refs() {
    let request = Frame::new("notifications:lobby", PHX_JOIN, json!({}))
        .with_ref("3")
        .with_join_ref(Some("3".to_string()));
    let reply =
        Frame::reply(&request, ReplyStatus::Error, json!({"reason": "unmatched topic"})).unwrap();

    assert_eq!(reply.event, PHX_REPLY);
    assert_eq!(reply.msg_ref.as_deref(), Some("3"));
    assert_eq!(reply.payload["status"], json!("error"));

    match ServerEvent::from_frame(reply).unwrap() {
        ServerEvent::Reply(payload) => assert_eq!(payload.status, ReplyStatus::Error),
        other => panic!("Expected reply, got {:?}", other),
    }
}
