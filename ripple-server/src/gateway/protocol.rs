use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events a client may send over the socket. Payloads are a closed set of
/// tagged variants, validated by deserialization before any dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Handshake frame; must be the first frame on the connection.
    #[serde(rename = "connect")]
    Connect { token: String },
    /// Join all of the caller's chats server-side plus their personal room.
    #[serde(rename = "auth:join")]
    AuthJoin,
    /// Join an explicit list of chat rooms. Membership was already checked
    /// by the REST layer that handed out these ids; the gateway does not
    /// re-verify per room.
    #[serde(rename = "join:chats")]
    JoinChats { chat_ids: Vec<String> },
    #[serde(rename = "chat:join")]
    ChatJoin { chat_id: String },
    #[serde(rename = "chat:leave")]
    ChatLeave { chat_id: String },
    /// Socket sends are plain text messages; richer types and attachments
    /// go through the REST create endpoint.
    #[serde(rename = "message:send")]
    SendMessage {
        chat_id: String,
        content: String,
        #[serde(default)]
        reply_to: Option<String>,
        #[serde(default)]
        temp_id: Option<String>,
    },
    #[serde(rename = "message:edit")]
    EditMessage { message_id: String, content: String },
    #[serde(rename = "message:delete")]
    DeleteMessage { message_id: String },
    #[serde(rename = "message:typing")]
    Typing { chat_id: String },
    #[serde(rename = "message:stopTyping")]
    StopTyping { chat_id: String },
    #[serde(rename = "message:markAsRead")]
    MarkAsRead { message_id: String, chat_id: String },
}

/// Events the server pushes to rooms or individual users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "auth:ok")]
    AuthOk { user_id: String },
    /// The persisted message, real id included. `temp_id` echoes the
    /// client's correlation id when the send carried one.
    #[serde(rename = "message:new")]
    NewMessage {
        message: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },
    #[serde(rename = "message:updated")]
    MessageUpdated { message: Message },
    #[serde(rename = "message:deleted")]
    MessageDeleted { message_id: String, chat_id: String },
    #[serde(rename = "message:read")]
    MessageRead {
        message_id: String,
        chat_id: String,
        user_id: String,
        seen_at: i64,
    },
    #[serde(rename = "message:typing")]
    Typing { chat_id: String, user_id: String },
    #[serde(rename = "message:stopTyping")]
    StopTyping { chat_id: String, user_id: String },
    #[serde(rename = "user:online")]
    UserOnline { user_id: String },
    #[serde(rename = "user:offline")]
    UserOffline { user_id: String, last_seen: i64 },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Serialize for the wire. Serialization of these variants cannot fail;
    /// the fallback keeps the send path infallible.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failure"}"#.to_string())
    }
}
