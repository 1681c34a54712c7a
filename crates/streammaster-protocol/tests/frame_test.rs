// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Record encoding/decoding tests for streammaster-protocol.

use serde_json::{Value, json};
use streammaster_protocol::frame::{
    CloseMessage, FrameError, HandshakeResponse, HubMessage, MAX_RECORD_SIZE, MessageType,
    RECORD_SEPARATOR, RecordBuffer,
};

fn strip(record: &str) -> &str {
    record.trim_end_matches(RECORD_SEPARATOR)
}

#[test]
fn test_message_type_conversions() {
    assert_eq!(MessageType::try_from(1u64).unwrap(), MessageType::Invocation);
    assert_eq!(MessageType::try_from(3u64).unwrap(), MessageType::Completion);
    assert_eq!(MessageType::try_from(6u64).unwrap(), MessageType::Ping);
    assert_eq!(MessageType::try_from(7u64).unwrap(), MessageType::Close);

    assert!(MessageType::try_from(0u64).is_err());
    assert!(MessageType::try_from(8u64).is_err());
    assert!(MessageType::try_from(100u64).is_err());
}

#[test]
fn test_server_event_invocation_decodes() {
    let record = r#"{"type":1,"target":"DataRefresh","arguments":["M3UFiles"]}"#;
    match HubMessage::decode(record).unwrap() {
        HubMessage::Invocation(inv) => {
            assert!(inv.invocation_id.is_none());
            assert_eq!(inv.target, "DataRefresh");
            assert_eq!(inv.arguments, vec![json!("M3UFiles")]);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_invocation_without_arguments_decodes() {
    let record = r#"{"type":1,"target":"AuthLogOut"}"#;
    match HubMessage::decode(record).unwrap() {
        HubMessage::Invocation(inv) => assert!(inv.arguments.is_empty()),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_completion_result_is_preserved() {
    let page = json!({"data": [{"id": 1, "name": "Provider A"}], "totalItemCount": 1});
    let encoded = HubMessage::completion("4", page.clone()).encode().unwrap();

    let decoded = HubMessage::decode(strip(&encoded)).unwrap();
    match decoded {
        HubMessage::Completion(c) => {
            assert_eq!(c.invocation_id, "4");
            assert_eq!(c.result, Some(page));
            assert!(c.error.is_none());
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_ping_encoding() {
    let encoded = HubMessage::Ping.encode().unwrap();
    let value: Value = serde_json::from_str(strip(&encoded)).unwrap();
    assert_eq!(value, json!({"type": 6}));
}

#[test]
fn test_close_message_defaults() {
    match HubMessage::decode(r#"{"type":7}"#).unwrap() {
        HubMessage::Close(close) => assert_eq!(close, CloseMessage::default()),
        other => panic!("unexpected message: {:?}", other),
    }

    match HubMessage::decode(r#"{"type":7,"error":"shutting down","allowReconnect":true}"#)
        .unwrap()
    {
        HubMessage::Close(close) => {
            assert_eq!(close.error.as_deref(), Some("shutting down"));
            assert!(close.allow_reconnect);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_unsupported_types_rejected() {
    for record in [
        r#"{"type":2,"invocationId":"1","item":1}"#,
        r#"{"type":4,"invocationId":"1","target":"x","arguments":[]}"#,
        r#"{"type":5,"invocationId":"1"}"#,
    ] {
        assert!(matches!(
            HubMessage::decode(record),
            Err(FrameError::Unsupported(_))
        ));
    }
}

#[test]
fn test_invalid_json_rejected() {
    assert!(matches!(
        HubMessage::decode("{not json"),
        Err(FrameError::Json(_))
    ));
}

#[test]
fn test_handshake_response_ok_and_error() {
    assert_eq!(HandshakeResponse::ok().encode().unwrap(), "{}\u{1e}");

    let decoded = HandshakeResponse::decode(r#"{"error":"Requested protocol 'x' is not available."}"#)
        .unwrap();
    assert!(decoded.error.unwrap().contains("not available"));
}

#[test]
fn test_record_buffer_multiple_records_in_one_push() {
    let mut buffer = RecordBuffer::new();
    let text = format!(
        "{}{}",
        HubMessage::Ping.encode().unwrap(),
        HubMessage::send("DataRefresh", vec![json!("EPGFiles")])
            .encode()
            .unwrap()
    );

    let records = buffer.push(&text).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(HubMessage::decode(&records[0]).unwrap(), HubMessage::Ping);
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn test_record_buffer_skips_empty_records() {
    let mut buffer = RecordBuffer::new();
    let records = buffer.push("\u{1e}\u{1e}{\"type\":6}\u{1e}").unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_record_buffer_overflow() {
    let mut buffer = RecordBuffer::new();
    let huge = "x".repeat(MAX_RECORD_SIZE + 1);
    let err = buffer.push(&huge).unwrap_err();
    assert!(matches!(err, FrameError::RecordTooLarge(_)));
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn test_frame_error_display() {
    let err = FrameError::InvalidMessageType(42);
    assert_eq!(format!("{}", err), "invalid message type: 42");

    let err = FrameError::MissingType;
    assert_eq!(format!("{}", err), "message has no type field");
}
