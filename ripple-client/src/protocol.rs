use serde::{Deserialize, Serialize};

/// Message as the client sees it on the wire. Server payloads carry more
/// fields (reactions, seen lists, audit state); unknown fields are ignored
/// on deserialization and absent ones default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub created_at: i64,
}

fn default_message_type() -> String {
    "text".to_string()
}

fn default_status() -> String {
    "sent".to_string()
}

/// Events the client sends to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "connect")]
    Connect { token: String },
    #[serde(rename = "auth:join")]
    AuthJoin,
    #[serde(rename = "join:chats")]
    JoinChats { chat_ids: Vec<String> },
    #[serde(rename = "chat:join")]
    ChatJoin { chat_id: String },
    #[serde(rename = "chat:leave")]
    ChatLeave { chat_id: String },
    /// Socket sends are plain text; richer message types go over REST.
    #[serde(rename = "message:send")]
    SendMessage {
        chat_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
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

/// Events the gateway pushes down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "auth:ok")]
    AuthOk { user_id: String },
    #[serde(rename = "message:new")]
    NewMessage {
        message: ChatMessage,
        #[serde(default)]
        temp_id: Option<String>,
    },
    #[serde(rename = "message:updated")]
    MessageUpdated { message: ChatMessage },
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_with_extra_fields_parses() {
        // The server's message payload carries fields this client ignores
        let json = r#"{
            "type": "message:new",
            "message": {
                "id": "m1",
                "chat_id": "c1",
                "sender_id": "alice",
                "content": "hi",
                "message_type": "text",
                "status": "sent",
                "reply_to": null,
                "reactions": [],
                "seen_by": [{"user_id": "alice", "seen_at": 1}],
                "created_at": 1
            },
            "temp_id": "tmp-1"
        }"#;
        let parsed: ServerEvent = serde_json::from_str(json).unwrap();
        if let ServerEvent::NewMessage { message, temp_id } = parsed {
            assert_eq!(message.id, "m1");
            assert_eq!(temp_id.as_deref(), Some("tmp-1"));
        } else {
            panic!("Expected NewMessage");
        }
    }

    #[test]
    fn test_send_event_wire_shape() {
        let ev = ClientEvent::SendMessage {
            chat_id: "c1".to_string(),
            content: "hello".to_string(),
            reply_to: None,
            temp_id: Some("tmp-9".to_string()),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""type":"message:send""#));
        assert!(json.contains(r#""temp_id":"tmp-9""#));
        assert!(!json.contains("reply_to"));
    }
}
