// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for the JSON hub protocol.
//!
//! Every message is a JSON object terminated by the ASCII record separator
//! (`0x1E`). A single WebSocket text frame may carry several records, and a
//! record may in principle be split across frames, so inbound text is fed
//! through a [`RecordBuffer`].
//!
//! The `type` field selects the message kind:
//! - 1: Invocation (both directions)
//! - 2: StreamItem
//! - 3: Completion
//! - 4: StreamInvocation
//! - 5: CancelInvocation
//! - 6: Ping
//! - 7: Close

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Record terminator for the JSON hub protocol.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Maximum size of a single buffered record (32 MB).
/// Paged listings of large M3U sources can be several megabytes.
pub const MAX_RECORD_SIZE: usize = 32 * 1024 * 1024;

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message types of the hub protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Method invocation (client to server or server to client)
    Invocation = 1,
    /// Item of a streaming result
    StreamItem = 2,
    /// Result of an invocation
    Completion = 3,
    /// Invocation that produces a stream
    StreamInvocation = 4,
    /// Cancel a streaming invocation
    CancelInvocation = 5,
    /// Keep-alive
    Ping = 6,
    /// Server is closing the connection
    Close = 7,
}

impl TryFrom<u64> for MessageType {
    type Error = FrameError;

    fn try_from(value: u64) -> Result<Self, <Self as TryFrom<u64>>::Error> {
        match value {
            1 => Ok(MessageType::Invocation),
            2 => Ok(MessageType::StreamItem),
            3 => Ok(MessageType::Completion),
            4 => Ok(MessageType::StreamInvocation),
            5 => Ok(MessageType::CancelInvocation),
            6 => Ok(MessageType::Ping),
            7 => Ok(MessageType::Close),
            _ => Err(FrameError::InvalidMessageType(value)),
        }
    }
}

/// Errors that can occur during record encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("record too large: {0} bytes (max: {MAX_RECORD_SIZE})")]
    RecordTooLarge(usize),

    #[error("invalid message type: {0}")]
    InvalidMessageType(u64),

    #[error("message has no type field")]
    MissingType,

    #[error("unsupported message type: {0:?}")]
    Unsupported(MessageType),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// First record sent by the client after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}

impl HandshakeRequest {
    /// Encode as a terminated record.
    pub fn encode(&self) -> Result<String, FrameError> {
        let mut out = serde_json::to_string(self)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }
}

/// Server reply to the handshake. An empty object means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }

    /// Encode as a terminated record.
    pub fn encode(&self) -> Result<String, FrameError> {
        let mut out = serde_json::to_string(self)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }

    /// Decode a single record (without separator).
    pub fn decode(record: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(record)?)
    }
}

/// A method invocation. Without an invocation id no completion is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// Result of an invocation, correlated by invocation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Close notification sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub allow_reconnect: bool,
}

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(Invocation),
    Completion(Completion),
    Ping,
    Close(CloseMessage),
}

impl HubMessage {
    /// Create an invocation that expects a completion.
    pub fn invocation(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        HubMessage::Invocation(Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        })
    }

    /// Create a non-blocking invocation (no completion expected).
    pub fn send(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        HubMessage::Invocation(Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
        })
    }

    /// Create a successful completion.
    pub fn completion(invocation_id: impl Into<String>, result: Value) -> Self {
        HubMessage::Completion(Completion {
            invocation_id: invocation_id.into(),
            result: Some(result),
            error: None,
        })
    }

    /// Create a failed completion.
    pub fn completion_error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        HubMessage::Completion(Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        })
    }

    /// Create a close message.
    pub fn close(error: Option<String>, allow_reconnect: bool) -> Self {
        HubMessage::Close(CloseMessage {
            error,
            allow_reconnect,
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            HubMessage::Invocation(_) => MessageType::Invocation,
            HubMessage::Completion(_) => MessageType::Completion,
            HubMessage::Ping => MessageType::Ping,
            HubMessage::Close(_) => MessageType::Close,
        }
    }

    /// Encode the message as a terminated record.
    pub fn encode(&self) -> Result<String, FrameError> {
        let body = match self {
            HubMessage::Invocation(inv) => serde_json::to_value(inv)?,
            HubMessage::Completion(c) => serde_json::to_value(c)?,
            HubMessage::Ping => Value::Object(Map::new()),
            HubMessage::Close(c) => serde_json::to_value(c)?,
        };

        let mut object = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        object.insert(
            "type".to_string(),
            Value::from(self.message_type() as u8 as u64),
        );

        let mut out = serde_json::to_string(&Value::Object(object))?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }

    /// Decode a single record (separator already stripped).
    pub fn decode(record: &str) -> Result<Self, FrameError> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(FrameError::RecordTooLarge(record.len()));
        }

        let value: Value = serde_json::from_str(record)?;
        let message_type = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(FrameError::MissingType)?;

        match MessageType::try_from(message_type)? {
            MessageType::Invocation => Ok(HubMessage::Invocation(serde_json::from_value(value)?)),
            MessageType::Completion => Ok(HubMessage::Completion(serde_json::from_value(value)?)),
            MessageType::Ping => Ok(HubMessage::Ping),
            MessageType::Close => Ok(HubMessage::Close(serde_json::from_value(value)?)),
            other => Err(FrameError::Unsupported(other)),
        }
    }
}

/// Accumulates inbound text and yields complete records.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    buf: String,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every record completed by it.
    pub fn push(&mut self, text: &str) -> Result<Vec<String>, FrameError> {
        self.buf.push_str(text);

        let mut records = Vec::new();
        while let Some(pos) = self.buf.find(RECORD_SEPARATOR) {
            let record: String = self.buf.drain(..=pos).collect();
            let record = record.trim_end_matches(RECORD_SEPARATOR);
            if !record.is_empty() {
                records.push(record.to_string());
            }
        }

        if self.buf.len() > MAX_RECORD_SIZE {
            let len = self.buf.len();
            self.buf.clear();
            return Err(FrameError::RecordTooLarge(len));
        }

        Ok(records)
    }

    /// Bytes buffered but not yet terminated.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}
