use std::collections::{HashMap, HashSet};

use crate::protocol::{ChatMessage, ServerEvent};

/// Thread-list entry kept up to date from live events.
#[derive(Debug, Clone, Default)]
pub struct ChatSummary {
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
}

/// Client-side chat view state.
///
/// Merges REST-fetched history with socket-pushed events: dedup is by
/// message id, ordering tolerates late arrivals, and a locally-sent
/// message is never inserted optimistically — the view waits for the
/// authoritative echo so "my own message" can't render twice. `temp_id`
/// exists only to correlate failures back to the input box.
pub struct ChatView {
    user_id: String,
    selected_chat: Option<String>,
    messages: Vec<ChatMessage>,
    seen_ids: HashSet<String>,
    summaries: HashMap<String, ChatSummary>,
    typing: HashMap<String, HashSet<String>>,
    online: HashSet<String>,
    /// temp_id -> content of sends awaiting their echo
    pending: HashMap<String, String>,
    pub last_error: Option<String>,
}

/// Correlation id for a send awaiting its authoritative echo.
pub fn new_temp_id() -> String {
    format!("tmp-{}", uuid::Uuid::new_v4())
}

impl ChatView {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            selected_chat: None,
            messages: Vec::new(),
            seen_ids: HashSet::new(),
            summaries: HashMap::new(),
            typing: HashMap::new(),
            online: HashSet::new(),
            pending: HashMap::new(),
            last_error: None,
        }
    }

    /// Open a chat with its REST-fetched history (chronological order, the
    /// way the message endpoint returns pages).
    pub fn select_chat(&mut self, chat_id: impl Into<String>, history: Vec<ChatMessage>) {
        let chat_id = chat_id.into();
        self.seen_ids = history.iter().map(|m| m.id.clone()).collect();
        self.messages = history;
        self.selected_chat = Some(chat_id);
    }

    /// Prepend an older page fetched while scrolling back.
    pub fn merge_older_page(&mut self, older: Vec<ChatMessage>) {
        let fresh: Vec<ChatMessage> = older
            .into_iter()
            .filter(|m| self.seen_ids.insert(m.id.clone()))
            .collect();
        if !fresh.is_empty() {
            let mut merged = fresh;
            merged.append(&mut self.messages);
            self.messages = merged;
        }
    }

    pub fn selected_chat(&self) -> Option<&str> {
        self.selected_chat.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn summary(&self, chat_id: &str) -> Option<&ChatSummary> {
        self.summaries.get(chat_id)
    }

    pub fn typing_users(&self, chat_id: &str) -> Vec<String> {
        self.typing
            .get(chat_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    /// Register a send awaiting its echo. Deliberately does NOT insert the
    /// message into the visible list.
    pub fn begin_send(&mut self, temp_id: impl Into<String>, content: impl Into<String>) {
        self.pending.insert(temp_id.into(), content.into());
    }

    /// A send failed; returns the content so the caller can restore the
    /// input field.
    pub fn fail_send(&mut self, temp_id: &str) -> Option<String> {
        self.pending.remove(temp_id)
    }

    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Apply one gateway event to the view.
    pub fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage { message, temp_id } => {
                if let Some(temp_id) = temp_id {
                    self.pending.remove(&temp_id);
                }
                self.apply_new_message(message);
            }
            ServerEvent::MessageUpdated { message } => {
                if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *existing = message;
                }
            }
            ServerEvent::MessageDeleted { message_id, .. } => {
                // seen_ids keeps the id so a stale re-broadcast can't
                // resurrect the message
                self.messages.retain(|m| m.id != message_id);
            }
            ServerEvent::MessageRead { message_id, .. } => {
                if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
                    message.status = "read".to_string();
                }
            }
            ServerEvent::Typing { chat_id, user_id } => {
                if user_id != self.user_id {
                    self.typing.entry(chat_id).or_default().insert(user_id);
                }
            }
            ServerEvent::StopTyping { chat_id, user_id } => {
                if let Some(users) = self.typing.get_mut(&chat_id) {
                    users.remove(&user_id);
                }
            }
            ServerEvent::UserOnline { user_id } => {
                self.online.insert(user_id);
            }
            ServerEvent::UserOffline { user_id, .. } => {
                self.online.remove(&user_id);
            }
            ServerEvent::Error { message } => {
                self.last_error = Some(message);
            }
            ServerEvent::AuthOk { .. } => {}
        }
    }

    fn apply_new_message(&mut self, message: ChatMessage) {
        let summary = self.summaries.entry(message.chat_id.clone()).or_default();
        summary.last_message_preview = Some(message.content.chars().take(100).collect());
        summary.last_message_at = Some(message.created_at);

        let is_open = self.selected_chat.as_deref() == Some(message.chat_id.as_str());
        if !is_open {
            // Not the open thread: only the list entry changes
            if message.sender_id != self.user_id {
                summary.unread_count += 1;
            }
            return;
        }

        if !self.seen_ids.insert(message.id.clone()) {
            return;
        }

        // Tolerate out-of-order delivery: slot by timestamp, id as tiebreak
        let position = self
            .messages
            .iter()
            .rposition(|m| {
                (m.created_at, m.id.as_str()) <= (message.created_at, message.id.as_str())
            })
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.messages.insert(position, message);
    }
}
