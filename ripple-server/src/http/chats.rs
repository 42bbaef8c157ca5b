use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::{created, ok, ApiError, ApiResponse, AuthUser};
use crate::error::ChatError;
use crate::models::input::{
    AddMemberInput, ArchiveChatInput, CreateChatInput, SearchQuery, UpdateChatInput, ValidateExt,
};
use crate::models::{Chat, ChatType, MemberRole};
use crate::services::{CreateChatParams, UpdateChatParams};
use crate::state::AppState;

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<CreateChatInput>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    input.validate_input()?;

    let chat_type = ChatType::from_str(&input.chat_type)
        .ok_or_else(|| ChatError::Validation("Invalid chat type".to_string()))?;

    let chat = state.chats.create_chat(
        &user_id,
        CreateChatParams {
            chat_type,
            members: input.members,
            name: input.name,
            description: input.description,
        },
    )?;

    Ok(created(chat))
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Chat>>>), ApiError> {
    let chats = state.chats.get_user_chats(&user_id)?;
    Ok(ok(chats))
}

pub async fn search_chats(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Chat>>>), ApiError> {
    query.validate_input()?;
    let chats = state.chats.search_chats(&user_id, &query.q)?;
    Ok(ok(chats))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    let chat = state.chats.get_chat_by_id(&chat_id, &user_id)?;
    Ok(ok(chat))
}

pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
    Json(input): Json<UpdateChatInput>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    input.validate_input()?;
    let chat = state.chats.update_chat(
        &chat_id,
        &user_id,
        UpdateChatParams {
            name: input.name,
            description: input.description,
            avatar_url: input.avatar_url,
        },
    )?;
    Ok(ok(chat))
}

pub async fn add_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
    Json(input): Json<AddMemberInput>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    input.validate_input()?;
    let role = input
        .role
        .as_deref()
        .and_then(MemberRole::from_str)
        .unwrap_or(MemberRole::Member);
    let chat = state
        .chats
        .add_member(&chat_id, &user_id, &input.user_id, role)?;
    Ok(ok(chat))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((chat_id, member_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    let chat = state.chats.remove_member(&chat_id, &user_id, &member_id)?;
    Ok(ok(chat))
}

pub async fn archive_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
    Json(input): Json<ArchiveChatInput>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), ApiError> {
    let chat = state
        .chats
        .set_archived(&chat_id, &user_id, input.archived)?;
    Ok(ok(chat))
}

pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(chat_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    state.chats.delete_chat(&chat_id, &user_id)?;
    Ok(ok(()))
}
