//! Wire envelope, tag vocabulary and typed payloads of the chat socket.
//!
//! Every frame is a JSON text frame of the shape `{"type": <tag>, "data": <payload|null>}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{ChatMessagePayload, ChatType};

/// Path of the chat socket relative to the server origin.
pub const CHAT_SOCKET_PATH: &str = "/api/ws/chat";

/// Query parameter carrying the bearer token during the handshake.
pub const TOKEN_QUERY_PARAM: &str = "token";

pub const TAG_CHAT: &str = "chat";
pub const TAG_HEARTBEAT: &str = "heartbeat";
pub const TAG_ERROR: &str = "error";
pub const TAG_SYSTEM: &str = "system";
pub const TAG_ACK: &str = "ack";
pub const TAG_REQUEST_CHAT_HISTORY: &str = "request_chat_history";

/// The `type` of an envelope.
///
/// Unknown strings are kept as [`MessageTag::Custom`] so parsing a tag never fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageTag {
    Chat,
    Heartbeat,
    Error,
    System,
    Ack,
    RequestChatHistory,
    Custom(String),
}

impl MessageTag {
    pub fn as_str(&self) -> &str {
        match self {
            MessageTag::Chat => TAG_CHAT,
            MessageTag::Heartbeat => TAG_HEARTBEAT,
            MessageTag::Error => TAG_ERROR,
            MessageTag::System => TAG_SYSTEM,
            MessageTag::Ack => TAG_ACK,
            MessageTag::RequestChatHistory => TAG_REQUEST_CHAT_HISTORY,
            MessageTag::Custom(tag) => tag,
        }
    }
}

impl From<&str> for MessageTag {
    fn from(tag: &str) -> Self {
        match tag {
            TAG_CHAT => MessageTag::Chat,
            TAG_HEARTBEAT => MessageTag::Heartbeat,
            TAG_ERROR => MessageTag::Error,
            TAG_SYSTEM => MessageTag::System,
            TAG_ACK => MessageTag::Ack,
            TAG_REQUEST_CHAT_HISTORY => MessageTag::RequestChatHistory,
            other => MessageTag::Custom(other.to_string()),
        }
    }
}

impl From<String> for MessageTag {
    fn from(tag: String) -> Self {
        match MessageTag::from(tag.as_str()) {
            MessageTag::Custom(_) => MessageTag::Custom(tag),
            known => known,
        }
    }
}

impl From<MessageTag> for String {
    fn from(tag: MessageTag) -> Self {
        match tag {
            MessageTag::Custom(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{type, data}` envelope around every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage<T = serde_json::Value> {
    #[serde(rename = "type")]
    pub tag: MessageTag,
    pub data: Option<T>,
}

impl<T> WireMessage<T> {
    pub fn new(tag: impl Into<MessageTag>, data: T) -> Self {
        Self {
            tag: tag.into(),
            data: Some(data),
        }
    }

    /// Envelope with `data: null`.
    pub fn empty(tag: impl Into<MessageTag>) -> Self {
        Self {
            tag: tag.into(),
            data: None,
        }
    }
}

impl WireMessage<ChatMessagePayload> {
    pub fn chat(payload: ChatMessagePayload) -> Self {
        Self::new(MessageTag::Chat, payload)
    }
}

impl WireMessage<HeartbeatPayload> {
    pub fn heartbeat(timestamp: i64) -> Self {
        Self::new(MessageTag::Heartbeat, HeartbeatPayload { timestamp })
    }
}

// --- Payloads ---

/// Heartbeat body; `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub timestamp: i64,
}

/// Read acknowledgement: everything up to `last_message_id` in the chat was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub chat_type: ChatType,
    pub chat_id: i64,
    pub last_message_id: i64,
}

/// Ask the server for the page of history preceding `last_message_id`
/// (the newest page when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryRequest {
    pub chat_type: ChatType,
    pub chat_id: i64,
    #[serde(default)]
    pub last_message_id: Option<i64>,
}

/// Server reply to a [`ChatHistoryRequest`], sent under the same tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(default)]
    pub messages: Vec<ChatMessagePayload>,
}

/// Decoded `data` of an inbound envelope, selected by its tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Chat(ChatMessagePayload),
    Heartbeat(HeartbeatPayload),
    Error(String),
    System(String),
    Ack(AckPayload),
    ChatHistory(ChatHistory),
    Other {
        tag: String,
        data: serde_json::Value,
    },
}

impl MessagePayload {
    /// Decode `data` into the payload type the tag calls for.
    pub fn decode(tag: &MessageTag, data: serde_json::Value) -> Result<Self, ProtocolError> {
        let typed = |data: serde_json::Value| -> Result<Self, serde_json::Error> {
            Ok(match tag {
                MessageTag::Chat => MessagePayload::Chat(serde_json::from_value(data)?),
                MessageTag::Heartbeat => MessagePayload::Heartbeat(serde_json::from_value(data)?),
                MessageTag::Ack => MessagePayload::Ack(serde_json::from_value(data)?),
                MessageTag::RequestChatHistory => {
                    MessagePayload::ChatHistory(serde_json::from_value(data)?)
                }
                MessageTag::Error => MessagePayload::Error(plain_text(data)),
                MessageTag::System => MessagePayload::System(plain_text(data)),
                MessageTag::Custom(tag) => MessagePayload::Other {
                    tag: tag.clone(),
                    data,
                },
            })
        };
        typed(data).map_err(|e| ProtocolError::payload(tag.as_str(), e))
    }
}

fn plain_text(data: serde_json::Value) -> String {
    match data {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Parse an inbound text frame into an envelope with untyped `data`.
pub fn parse_frame(text: &str) -> Result<WireMessage, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::MalformedFrame)
}
