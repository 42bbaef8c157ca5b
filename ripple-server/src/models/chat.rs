use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
    Channel,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ChatType::Direct),
            "group" => Some(ChatType::Group),
            "channel" => Some(ChatType::Channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Moderator,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Moderator => "moderator",
            MemberRole::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(MemberRole::Admin),
            "moderator" => Some(MemberRole::Moderator),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

/// A membership record. Never removed from a chat, only deactivated, so
/// historical membership stays reconstructible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMember {
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: i64,
    pub is_active: bool,
    pub left_at: Option<i64>,
}

/// Denormalized summary of the newest message, kept on the chat row so
/// thread lists render without touching the messages table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: String,
    pub sender_id: String,
    pub timestamp: i64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveState {
    pub is_archived: bool,
    pub archived_at: Option<i64>,
    pub archived_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub is_private: bool,
    pub allow_invites: bool,
    pub mute_notifications: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: String,
    pub members: Vec<ChatMember>,
    pub message_count: i64,
    pub last_message: Option<LastMessage>,
    pub archived: ArchiveState,
    pub settings: ChatSettings,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Chat {
    /// Active-member lookup; inactive (left) members do not count.
    pub fn active_member(&self, user_id: &str) -> Option<&ChatMember> {
        self.members
            .iter()
            .find(|m| m.user_id == user_id && m.is_active)
    }
}
