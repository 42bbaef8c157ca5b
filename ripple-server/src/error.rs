use thiserror::Error;

/// Business-rule and infrastructure failures for the chat core.
///
/// Services return these instead of throwing; the HTTP layer maps each
/// variant to a status code and the gateway maps them to an `error` event.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    /// Existence and membership checks are fused on purpose: a non-member
    /// gets the same answer as a request for a chat that does not exist.
    #[error("chat not found")]
    NotFoundOrForbidden,

    #[error("access denied")]
    AccessDenied,

    #[error("user is already a member of this chat")]
    AlreadyMember,

    #[error("{0}")]
    InvalidOperation(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// Message safe to surface to clients. Storage and programming errors
    /// collapse to a generic string so internals never leak over the wire.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Database(_) | ChatError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
