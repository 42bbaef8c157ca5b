use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::{created, ok, ApiError, ApiResponse, AuthUser};
use crate::gateway::{chat_room, ServerEvent};
use crate::models::input::{
    EditMessageInput, PageQuery, ReactionInput, SearchQuery, SendMessageInput, ValidateExt,
};
use crate::models::{Message, MessagePage, MessageType};
use crate::services::SendMessageParams;
use crate::state::AppState;

/// REST message creation. Persists through the same service as the socket
/// path and fans the persisted message out through the same rooms, so both
/// entry points deliver one authoritative copy.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
    input.validate_input()?;

    let message_type = input
        .message_type
        .as_deref()
        .and_then(MessageType::from_str)
        .unwrap_or(MessageType::Text);

    let message = state.messages.create_message(
        &user_id,
        SendMessageParams {
            chat_id: input.chat_id,
            content: input.content,
            message_type,
            reply_to: input.reply_to,
            attachments: input.attachments.unwrap_or_default(),
        },
    )?;

    let event = ServerEvent::NewMessage {
        message: message.clone(),
        temp_id: None,
    };
    state
        .gateway
        .broadcast_to_room(&chat_room(&message.chat_id), &event.to_json(), None);

    Ok(created(message))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<(StatusCode, Json<ApiResponse<MessagePage>>), ApiError> {
    query.validate_input()?;
    let page = state
        .messages
        .get_chat_messages(&chat_id, &user_id, query.page, query.limit)?;
    Ok(ok(page))
}

pub async fn search_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<(StatusCode, Json<ApiResponse<MessagePage>>), ApiError> {
    query.validate_input()?;
    let page = state
        .messages
        .search_messages(&chat_id, &user_id, &query.q, query.page, query.limit)?;
    Ok(ok(page))
}

pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
    Json(input): Json<EditMessageInput>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
    input.validate_input()?;
    let message = state
        .messages
        .update_message(&message_id, &user_id, &input.content)?;

    let event = ServerEvent::MessageUpdated {
        message: message.clone(),
    };
    state
        .gateway
        .broadcast_to_room(&chat_room(&message.chat_id), &event.to_json(), None);

    Ok(ok(message))
}

pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
    let message = state.messages.delete_message(&message_id, &user_id)?;

    let event = ServerEvent::MessageDeleted {
        message_id: message.id.clone(),
        chat_id: message.chat_id.clone(),
    };
    state
        .gateway
        .broadcast_to_room(&chat_room(&message.chat_id), &event.to_json(), None);

    Ok(ok(message))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
    let message = state.messages.mark_message_as_read(&message_id, &user_id)?;

    let seen_at = message
        .seen_by
        .iter()
        .find(|s| s.user_id == user_id)
        .map(|s| s.seen_at)
        .unwrap_or_default();
    let event = ServerEvent::MessageRead {
        message_id: message.id.clone(),
        chat_id: message.chat_id.clone(),
        user_id,
        seen_at,
    };
    state
        .gateway
        .broadcast_to_room(&chat_room(&message.chat_id), &event.to_json(), None);

    Ok(ok(message))
}

pub async fn react(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
    Json(input): Json<ReactionInput>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
    input.validate_input()?;
    let message = state
        .messages
        .add_reaction(&message_id, &user_id, &input.emoji)?;
    Ok(ok(message))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let count = state.messages.get_unread_message_count(&user_id)?;
    Ok(ok(serde_json::json!({ "count": count })))
}
