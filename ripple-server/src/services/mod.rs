mod chat;
mod message;

pub use chat::{ChatService, CreateChatParams, UpdateChatParams};
pub use message::{MessageService, SendMessageParams};
