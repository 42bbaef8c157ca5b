use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::db::{now_ms, Database};
use crate::error::{ChatError, ChatResult};
use crate::models::{
    DeleteState, EditState, Message, MessagePage, MessageStatus, MessageType, Reaction, SeenEntry,
};
use crate::services::chat::require_active_member;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, message_type, attachments, \
     status, reply_to_id, is_edited, edited_at, original_content, is_deleted, deleted_at, \
     deleted_by, created_at";

/// Length of the denormalized preview written onto the parent chat.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct SendMessageParams {
    pub chat_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<String>,
    pub attachments: Vec<String>,
}

/// Owns message documents. The one cross-entity write — the parent chat's
/// summary — happens in the same transaction as message creation, so the
/// summary never advances past a message that failed to persist.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
}

impl MessageService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a message. Membership is re-derived from the chat document
    /// here, never trusted from the caller.
    pub fn create_message(&self, sender_id: &str, params: SendMessageParams) -> ChatResult<Message> {
        let mut conn = self.db.lock()?;

        // Same check as the read path, but surfaced as AccessDenied: the
        // send path is about authorization, not lookup.
        require_active_member(&conn, &params.chat_id, sender_id)
            .map_err(|_| ChatError::AccessDenied)?;

        let now = now_ms();
        let message_id = uuid::Uuid::new_v4().to_string();
        let attachments_json = serde_json::to_string(&params.attachments)
            .map_err(|e| ChatError::Internal(e.to_string()))?;
        let preview: String = params.content.chars().take(PREVIEW_CHARS).collect();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, message_type, attachments, \
                 status, reply_to_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'sent', ?7, ?8)",
            params![
                message_id,
                params.chat_id,
                sender_id,
                params.content,
                params.message_type.as_str(),
                attachments_json,
                params.reply_to,
                now
            ],
        )?;
        // The sender has trivially seen their own message.
        tx.execute(
            "INSERT INTO message_seen (message_id, user_id, seen_at) VALUES (?1, ?2, ?3)",
            params![message_id, sender_id, now],
        )?;
        tx.execute(
            "UPDATE chats SET
                 last_message_id = ?1,
                 last_message_sender = ?2,
                 last_message_at = ?3,
                 last_message_preview = ?4,
                 message_count = message_count + 1,
                 updated_at = ?3
             WHERE id = ?5",
            params![message_id, sender_id, now, preview, params.chat_id],
        )?;
        tx.commit()?;

        load_message(&conn, &message_id)
    }

    /// One page of a chat's messages, soft-deleted ones excluded. Stored
    /// newest-first for efficient paging, reversed before return so the
    /// caller always renders oldest-first.
    pub fn get_chat_messages(
        &self,
        chat_id: &str,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> ChatResult<MessagePage> {
        let conn = self.db.lock()?;
        require_active_member(&conn, chat_id, user_id)?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND is_deleted = 0",
            params![chat_id],
            |row| row.get(0),
        )?;

        let offset = (page as i64 - 1) * limit as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 AND is_deleted = 0
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let mut messages: Vec<Message> = stmt
            .query_map(params![chat_id, limit, offset], message_from_row)?
            .collect::<Result<_, _>>()?;
        for message in &mut messages {
            enrich_message(&conn, message)?;
        }

        // Chronological order for top-to-bottom rendering.
        messages.reverse();

        Ok(MessagePage {
            messages,
            page,
            limit,
            total,
            has_next_page: (page as i64) * (limit as i64) < total,
            has_prev_page: page > 1,
        })
    }

    /// Edit a message. Sender-only; the pre-edit content is snapshotted
    /// exactly once, on the first edit.
    pub fn update_message(&self, message_id: &str, user_id: &str, content: &str) -> ChatResult<Message> {
        let conn = self.db.lock()?;
        let message = load_message(&conn, message_id)?;

        if message.sender_id != user_id {
            return Err(ChatError::AccessDenied);
        }
        if message.deleted.is_deleted {
            return Err(ChatError::InvalidOperation(
                "cannot edit a deleted message".to_string(),
            ));
        }

        let original = message
            .edited
            .original_content
            .unwrap_or(message.content);

        conn.execute(
            "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2, original_content = ?3
             WHERE id = ?4",
            params![content, now_ms(), original, message_id],
        )?;

        load_message(&conn, message_id)
    }

    /// Soft-delete a message. The row stays put for audit; reactions and
    /// seen entries survive but are hidden along with it.
    pub fn delete_message(&self, message_id: &str, user_id: &str) -> ChatResult<Message> {
        let conn = self.db.lock()?;
        let message = load_message(&conn, message_id)?;

        if message.sender_id != user_id {
            return Err(ChatError::AccessDenied);
        }
        if message.deleted.is_deleted {
            return Ok(message);
        }

        conn.execute(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?1, deleted_by = ?2 WHERE id = ?3",
            params![now_ms(), user_id, message_id],
        )?;

        info!(message_id = %message_id, "Message deleted");
        load_message(&conn, message_id)
    }

    /// Record that `user_id` has seen a message. Idempotent: a repeat call
    /// returns without touching the row.
    pub fn mark_message_as_read(&self, message_id: &str, user_id: &str) -> ChatResult<Message> {
        let conn = self.db.lock()?;
        let message = load_message(&conn, message_id)?;
        require_active_member(&conn, &message.chat_id, user_id)
            .map_err(|_| ChatError::AccessDenied)?;

        if message.seen_by.iter().any(|s| s.user_id == user_id) {
            return Ok(message);
        }

        conn.execute(
            "INSERT INTO message_seen (message_id, user_id, seen_at) VALUES (?1, ?2, ?3)",
            params![message_id, user_id, now_ms()],
        )?;
        conn.execute(
            "UPDATE messages SET status = 'read' WHERE id = ?1",
            params![message_id],
        )?;

        load_message(&conn, message_id)
    }

    /// Toggle a reaction keyed by (user, emoji): re-submitting the same
    /// emoji removes it.
    pub fn add_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> ChatResult<Message> {
        let conn = self.db.lock()?;
        let message = load_message(&conn, message_id)?;
        if message.deleted.is_deleted {
            return Err(ChatError::NotFoundOrForbidden);
        }
        require_active_member(&conn, &message.chat_id, user_id)
            .map_err(|_| ChatError::AccessDenied)?;

        let removed = conn.execute(
            "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id, user_id, emoji],
        )?;
        if removed == 0 {
            conn.execute(
                "INSERT INTO message_reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![message_id, user_id, emoji, now_ms()],
            )?;
        }

        load_message(&conn, message_id)
    }

    /// Substring search over a chat's non-deleted messages. Newest-first —
    /// search results read by recency, unlike thread pages.
    pub fn search_messages(
        &self,
        chat_id: &str,
        user_id: &str,
        query: &str,
        page: u32,
        limit: u32,
    ) -> ChatResult<MessagePage> {
        let conn = self.db.lock()?;
        require_active_member(&conn, chat_id, user_id)?;

        let pattern = format!("%{}%", query.to_lowercase());
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE chat_id = ?1 AND is_deleted = 0 AND LOWER(content) LIKE ?2",
            params![chat_id, pattern],
            |row| row.get(0),
        )?;

        let offset = (page as i64 - 1) * limit as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 AND is_deleted = 0 AND LOWER(content) LIKE ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let mut messages: Vec<Message> = stmt
            .query_map(params![chat_id, pattern, limit, offset], message_from_row)?
            .collect::<Result<_, _>>()?;
        for message in &mut messages {
            enrich_message(&conn, message)?;
        }

        Ok(MessagePage {
            messages,
            page,
            limit,
            total,
            has_next_page: (page as i64) * (limit as i64) < total,
            has_prev_page: page > 1,
        })
    }

    /// Unseen messages addressed to the user across all their active,
    /// non-archived chats.
    pub fn get_unread_message_count(&self, user_id: &str) -> ChatResult<i64> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN chats c ON c.id = m.chat_id
             JOIN chat_members cm ON cm.chat_id = m.chat_id
             WHERE cm.user_id = ?1 AND cm.is_active = 1
               AND c.is_archived = 0
               AND m.is_deleted = 0
               AND m.sender_id != ?1
               AND NOT EXISTS (
                   SELECT 1 FROM message_seen s
                   WHERE s.message_id = m.id AND s.user_id = ?1
               )",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Direct id lookup, soft-deleted rows included. This is the audit
    /// path; normal reads never reach deleted messages.
    pub fn get_message_by_id(&self, message_id: &str) -> ChatResult<Message> {
        let conn = self.db.lock()?;
        load_message(&conn, message_id)
    }
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let message_type: String = row.get(4)?;
    let attachments_json: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        message_type: MessageType::from_str(&message_type).unwrap_or(MessageType::Text),
        attachments: serde_json::from_str(&attachments_json).unwrap_or_default(),
        status: MessageStatus::from_str(&status).unwrap_or(MessageStatus::Sent),
        reply_to: row.get(7)?,
        reactions: Vec::new(),
        seen_by: Vec::new(),
        edited: EditState {
            is_edited: row.get::<_, i64>(8)? == 1,
            edited_at: row.get(9)?,
            original_content: row.get(10)?,
        },
        deleted: DeleteState {
            is_deleted: row.get::<_, i64>(11)? == 1,
            deleted_at: row.get(12)?,
            deleted_by: row.get(13)?,
        },
        created_at: row.get(14)?,
    })
}

fn enrich_message(conn: &Connection, message: &mut Message) -> ChatResult<()> {
    let mut stmt = conn.prepare(
        "SELECT user_id, emoji, created_at FROM message_reactions
         WHERE message_id = ?1 ORDER BY created_at ASC",
    )?;
    message.reactions = stmt
        .query_map(params![message.id], |row| {
            Ok(Reaction {
                user_id: row.get(0)?,
                emoji: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT user_id, seen_at FROM message_seen
         WHERE message_id = ?1 ORDER BY seen_at ASC",
    )?;
    message.seen_by = stmt
        .query_map(params![message.id], |row| {
            Ok(SeenEntry {
                user_id: row.get(0)?,
                seen_at: row.get(1)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    Ok(())
}

pub(crate) fn load_message(conn: &Connection, message_id: &str) -> ChatResult<Message> {
    let mut message = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![message_id],
            message_from_row,
        )
        .optional()?
        .ok_or(ChatError::NotFoundOrForbidden)?;

    enrich_message(conn, &mut message)?;
    Ok(message)
}
