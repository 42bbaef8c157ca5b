//! Ripple client library
//!
//! A socket client with reconnect handling plus the chat view state that
//! merges REST-fetched history with live gateway events.

mod protocol;
mod reconcile;
mod ws;

pub use protocol::{ChatMessage, ClientEvent, ServerEvent};
pub use reconcile::{new_temp_id, ChatSummary, ChatView};
pub use ws::SocketClient;
