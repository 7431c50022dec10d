//! Relay protocol definitions.
//!
//! Clients and the relay exchange named events over a WebSocket. Every text
//! frame carries exactly one event as a JSON object:
//!
//! ```text
//! {"event": "sendMessage", "data": {"senderId": "alice", "receiverId": "bob", "text": "hi"}}
//! ```
//!
//! Field names on the wire are camelCase so existing browser clients can
//! talk to the relay unchanged.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

// ── Identifiers & Data Model ──────────────────────────────────────────────────

/// Transient handle for one live socket, assigned when the gateway accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh, random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A user that is currently online, and the connection they are reachable on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: String,
    pub connection_id: ConnectionId,
}

/// A direct message between two users.
///
/// Everything except `seen` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "one_or_many"
    )]
    pub images: Option<Vec<Value>>,
    #[serde(default)]
    pub seen: bool,
}

impl Message {
    /// Create an unseen message with a fresh random 128-bit id.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: Option<String>,
        images: Option<Vec<Value>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            text,
            images,
            seen: false,
        }
    }
}

impl From<SendMessage> for Message {
    fn from(payload: SendMessage) -> Self {
        Message::new(
            payload.sender_id,
            payload.receiver_id,
            payload.text,
            payload.images,
        )
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Payload of `addUser`.
///
/// Browser clients send the bare user id as the event data; the object form
/// `{"userId": ...}` is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Bare(String),
    Object {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl Identity {
    pub fn user_id(&self) -> &str {
        match self {
            Identity::Bare(user_id) | Identity::Object { user_id } => user_id.as_str(),
        }
    }
}

/// Payload of `sendMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub images: Option<Vec<Value>>,
}

/// Payload of `messageSeen`, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenReceipt {
    pub sender_id: String,
    pub receiver_id: String,
    pub message_id: String,
}

/// Payload of `updateLastMessage` / `getLastMessage`. Opaque to the relay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageUpdate {
    #[serde(default)]
    pub last_message: Value,
    #[serde(default)]
    pub last_messages_id: Value,
}

/// Accept `images` as an array, a single value, or null.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(other) => Some(vec![other]),
    })
}

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Events sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a user id. Everyone gets the new user list.
    AddUser(Identity),

    /// Send a direct message. Stored always, delivered if the receiver is online.
    SendMessage(SendMessage),

    /// The receiver has read a message; tell the original sender.
    MessageSeen(SeenReceipt),

    /// Conversation-list preview refresh, fanned out to everyone.
    UpdateLastMessage(LastMessageUpdate),
}

impl ClientEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::AddUser(_) => "addUser",
            ClientEvent::SendMessage(_) => "sendMessage",
            ClientEvent::MessageSeen(_) => "messageSeen",
            ClientEvent::UpdateLastMessage(_) => "updateLastMessage",
        }
    }
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Events sent from the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full list of online users. Broadcast on every presence change.
    GetUsers(Vec<UserPresence>),

    /// A message addressed to this client.
    GetMessage(Message),

    /// A message this client sent has been seen by its receiver.
    MessageSeen(SeenReceipt),

    /// Broadcast of a conversation preview update.
    GetLastMessage(LastMessageUpdate),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::GetUsers(_) => "getUsers",
            ServerEvent::GetMessage(_) => "getMessage",
            ServerEvent::MessageSeen(_) => "messageSeen",
            ServerEvent::GetLastMessage(_) => "getLastMessage",
        }
    }
}
