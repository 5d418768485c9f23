//! Chat payload models carried inside `chat` envelopes.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// --- Enumerations ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
}

/// The `msgType` discriminator of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    Text,
    Compound,
    FriendRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompoundPartType {
    Text,
    Image,
}

// --- Message content ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextContent {
    pub content: String,
}

/// One segment of a mixed text/image message. For images `content` is the
/// object key or URL of the uploaded picture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompoundPart {
    #[serde(rename = "type")]
    pub part_type: CompoundPartType,
    pub content: String,
}

impl CompoundPart {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            part_type: CompoundPartType::Text,
            content: content.into(),
        }
    }

    pub fn image(content: impl Into<String>) -> Self {
        Self {
            part_type: CompoundPartType::Image,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompoundContent {
    pub parts: Vec<CompoundPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestContent {
    pub is_accepted: bool,
}

/// `msgType` together with the `content` whose shape it dictates.
///
/// Flattened into [`ChatMessagePayload`], so a frame whose `content` does not
/// match its `msgType` fails to deserialize instead of producing a
/// half-typed message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msgType", content = "content", rename_all = "snake_case")]
pub enum ChatBody {
    Text(TextContent),
    Compound(CompoundContent),
    FriendRequest(FriendRequestContent),
}

impl ChatBody {
    pub fn msg_type(&self) -> ChatMessageType {
        match self {
            ChatBody::Text(_) => ChatMessageType::Text,
            ChatBody::Compound(_) => ChatMessageType::Compound,
            ChatBody::FriendRequest(_) => ChatMessageType::FriendRequest,
        }
    }
}

/// Server timestamp of a stored message.
///
/// The server may emit either an ISO-8601 string or epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SentAt {
    EpochMillis(i64),
    Iso(String),
}

impl SentAt {
    /// Interpret the timestamp as UTC. Offset-less ISO strings are taken as UTC.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            SentAt::EpochMillis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            SentAt::Iso(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                }),
        }
    }
}

// --- Chat message ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// Assigned by the server once the message is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub chat_type: ChatType,
    pub chat_id: i64,
    pub from: i64,
    pub to: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    #[serde(flatten)]
    pub body: ChatBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<SentAt>,
}

impl ChatMessagePayload {
    fn new(chat_type: ChatType, chat_id: i64, from: i64, to: i64, body: ChatBody) -> Self {
        Self {
            id: None,
            chat_type,
            chat_id,
            from,
            to,
            reply_to: None,
            body,
            sent_at: None,
        }
    }

    /// Plain text message.
    pub fn text(
        chat_type: ChatType,
        chat_id: i64,
        from: i64,
        to: i64,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            chat_type,
            chat_id,
            from,
            to,
            ChatBody::Text(TextContent {
                content: text.into(),
            }),
        )
    }

    /// Text message quoting an earlier message.
    pub fn reply(
        chat_type: ChatType,
        chat_id: i64,
        from: i64,
        to: i64,
        reply_to: i64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            reply_to: Some(reply_to),
            ..Self::text(chat_type, chat_id, from, to, text)
        }
    }

    /// Mixed text and image message.
    pub fn compound(
        chat_type: ChatType,
        chat_id: i64,
        from: i64,
        to: i64,
        parts: Vec<CompoundPart>,
    ) -> Self {
        Self::new(
            chat_type,
            chat_id,
            from,
            to,
            ChatBody::Compound(CompoundContent { parts }),
        )
    }

    /// Friend request, or its acceptance notice when `is_accepted` is set.
    pub fn friend_request(from: i64, to: i64, is_accepted: bool) -> Self {
        // the server assigns the chat id once the private chat exists
        Self::new(
            ChatType::Private,
            0,
            from,
            to,
            ChatBody::FriendRequest(FriendRequestContent { is_accepted }),
        )
    }

    pub fn msg_type(&self) -> ChatMessageType {
        self.body.msg_type()
    }

    pub fn sent_at_utc(&self) -> Option<DateTime<Utc>> {
        self.sent_at.as_ref().and_then(SentAt::to_utc)
    }
}
