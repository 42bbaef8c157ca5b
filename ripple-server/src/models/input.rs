//! Input DTOs with garde validation for the transport boundary.
//!
//! These structs validate client data before any service runs.

use garde::Validate;
use serde::Deserialize;

use crate::error::ChatError;

/// Validation constants
const MAX_USER_ID_LENGTH: usize = 128;
const MAX_CHAT_NAME_LENGTH: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 500;
const MAX_MESSAGE_LENGTH: usize = 10_000;
const MAX_SEARCH_QUERY_LENGTH: usize = 200;
const MAX_MEMBERS_PER_REQUEST: usize = 100;
const MAX_EMOJI_LENGTH: usize = 32;

/// Custom validation for chat type
fn validate_chat_type(value: &str, _ctx: &()) -> garde::Result {
    match value {
        "direct" | "group" | "channel" => Ok(()),
        _ => Err(garde::Error::new("Invalid chat type")),
    }
}

/// Custom validation for message type
fn validate_message_type(value: &str, _ctx: &()) -> garde::Result {
    match value {
        "text" | "image" | "file" | "audio" | "video" | "system" => Ok(()),
        _ => Err(garde::Error::new("Invalid message type")),
    }
}

/// Custom validation for member role
fn validate_role(value: &str, _ctx: &()) -> garde::Result {
    match value {
        "admin" | "moderator" | "member" => Ok(()),
        _ => Err(garde::Error::new("Invalid member role")),
    }
}

/// Input for creating a chat
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct CreateChatInput {
    #[serde(rename = "type")]
    #[garde(custom(validate_chat_type))]
    pub chat_type: String,
    #[garde(
        length(min = 1, max = MAX_MEMBERS_PER_REQUEST),
        inner(length(min = 1, max = MAX_USER_ID_LENGTH))
    )]
    pub members: Vec<String>,
    #[garde(inner(length(min = 1, max = MAX_CHAT_NAME_LENGTH)))]
    pub name: Option<String>,
    #[garde(inner(length(max = MAX_DESCRIPTION_LENGTH)))]
    pub description: Option<String>,
}

/// Input for updating chat metadata
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct UpdateChatInput {
    #[garde(inner(length(min = 1, max = MAX_CHAT_NAME_LENGTH)))]
    pub name: Option<String>,
    #[garde(inner(length(max = MAX_DESCRIPTION_LENGTH)))]
    pub description: Option<String>,
    #[garde(inner(length(max = MAX_DESCRIPTION_LENGTH)))]
    pub avatar_url: Option<String>,
}

/// Input for adding a chat member
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct AddMemberInput {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub user_id: String,
    #[garde(inner(custom(validate_role)))]
    pub role: Option<String>,
}

/// Input for archiving or unarchiving a chat
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct ArchiveChatInput {
    #[garde(skip)]
    pub archived: bool,
}

/// Input for sending a message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub chat_id: String,
    #[garde(length(min = 1, max = MAX_MESSAGE_LENGTH))]
    pub content: String,
    #[serde(rename = "type")]
    #[garde(inner(custom(validate_message_type)))]
    pub message_type: Option<String>,
    #[garde(inner(length(min = 1, max = MAX_USER_ID_LENGTH)))]
    pub reply_to: Option<String>,
    #[garde(inner(length(max = 20), inner(length(max = 2048))))]
    pub attachments: Option<Vec<String>>,
}

/// Input for editing a message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct EditMessageInput {
    #[garde(length(min = 1, max = MAX_MESSAGE_LENGTH))]
    pub content: String,
}

/// Input for toggling a reaction
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct ReactionInput {
    #[garde(length(min = 1, max = MAX_EMOJI_LENGTH))]
    pub emoji: String,
}

/// Pagination query; the [1,100] limit bound is enforced here at the
/// transport, not by the services.
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct PageQuery {
    #[serde(default = "default_page")]
    #[garde(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[garde(range(min = 1, max = 100))]
    pub limit: u32,
}

/// Search query with the same pagination bounds
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SearchQuery {
    #[garde(length(min = 1, max = MAX_SEARCH_QUERY_LENGTH))]
    pub q: String,
    #[serde(default = "default_page")]
    #[garde(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[garde(range(min = 1, max = 100))]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

/// Helper trait to convert garde validation errors to ChatError
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), ChatError>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), ChatError> {
        self.validate()
            .map_err(|e| ChatError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_chat_rejects_unknown_type() {
        let input = CreateChatInput {
            chat_type: "broadcast".to_string(),
            members: vec!["alice".to_string()],
            name: None,
            description: None,
        };
        assert!(input.validate_input().is_err());
    }

    #[test]
    fn test_page_query_bounds() {
        let ok = PageQuery { page: 1, limit: 100 };
        assert!(ok.validate_input().is_ok());

        let too_big = PageQuery { page: 1, limit: 101 };
        assert!(too_big.validate_input().is_err());

        let zero = PageQuery { page: 0, limit: 10 };
        assert!(zero.validate_input().is_err());
    }

    #[test]
    fn test_send_message_rejects_empty_content() {
        let input = SendMessageInput {
            chat_id: "c1".to_string(),
            content: String::new(),
            message_type: None,
            reply_to: None,
            attachments: None,
        };
        assert!(input.validate_input().is_err());
    }
}
