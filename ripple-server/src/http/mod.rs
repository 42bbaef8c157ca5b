mod chats;
mod messages;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth;
use crate::error::ChatError;
use crate::state::AppState;

/// Uniform response envelope: every endpoint answers with
/// `{success, message, data?}` and lets the status code carry the taxonomy.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "ok".to_string(),
            data: Some(data),
        }
    }
}

pub(crate) fn ok<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

pub(crate) fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::ok(data)))
}

/// Maps the service error taxonomy onto HTTP statuses. The body reuses the
/// envelope so clients parse one shape everywhere.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Validation(_) | ChatError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            ChatError::AccessDenied => StatusCode::FORBIDDEN,
            ChatError::AlreadyMember => StatusCode::CONFLICT,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Database(_) | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = ApiResponse::<()> {
            success: false,
            message: self.0.public_message(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
/// Identity comes from the verified token, never from bodies or queries.
pub struct AuthUser(pub String);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError(ChatError::Authentication("missing bearer token".to_string()))
            })?;

        let user_id = auth::verify_token(&state.config.auth_secret, token).map_err(ApiError)?;
        Ok(AuthUser(user_id))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chats", post(chats::create_chat).get(chats::list_chats))
        .route("/api/chats/search", get(chats::search_chats))
        .route(
            "/api/chats/:chat_id",
            get(chats::get_chat)
                .put(chats::update_chat)
                .delete(chats::delete_chat),
        )
        .route("/api/chats/:chat_id/members", post(chats::add_member))
        .route(
            "/api/chats/:chat_id/members/:user_id",
            delete(chats::remove_member),
        )
        .route("/api/chats/:chat_id/archive", patch(chats::archive_chat))
        .route("/api/messages", post(messages::send_message))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/messages/chat/:chat_id", get(messages::list_messages))
        .route(
            "/api/messages/chat/:chat_id/search",
            get(messages::search_messages),
        )
        .route(
            "/api/messages/:message_id",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/api/messages/:message_id/read", patch(messages::mark_read))
        .route("/api/messages/:message_id/react", post(messages::react))
        .with_state(state)
}
