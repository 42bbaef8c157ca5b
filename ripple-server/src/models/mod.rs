mod chat;
pub mod input;
mod message;

pub use chat::{ArchiveState, Chat, ChatMember, ChatSettings, ChatType, LastMessage, MemberRole};
pub use message::{
    DeleteState, EditState, Message, MessagePage, MessageStatus, MessageType, Reaction, SeenEntry,
};
