use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::db::{direct_pair_key, now_ms, Database};
use crate::error::{ChatError, ChatResult};
use crate::models::{ArchiveState, Chat, ChatMember, ChatSettings, ChatType, LastMessage, MemberRole};

const CHAT_COLUMNS: &str = "id, chat_type, name, description, avatar_url, created_by, \
     message_count, last_message_id, last_message_sender, last_message_at, last_message_preview, \
     is_archived, archived_at, archived_by, is_private, allow_invites, mute_notifications, \
     created_at, updated_at";

const SEARCH_RESULT_CAP: u32 = 20;

#[derive(Debug, Clone)]
pub struct CreateChatParams {
    pub chat_type: ChatType,
    pub members: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateChatParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// Owns chat documents: creation, retrieval, membership mutation, archival,
/// deletion and search, all behind membership-based access control.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
}

impl ChatService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a chat. Direct-chat creation is idempotent: a second request
    /// for the same unordered pair returns the existing chat, and the
    /// UNIQUE key on the normalized pair closes the concurrent-create race.
    pub fn create_chat(&self, created_by: &str, params: CreateChatParams) -> ChatResult<Chat> {
        // The creator is always a member, whether or not the caller listed them.
        let mut member_ids: Vec<String> = params.members.clone();
        if !member_ids.iter().any(|m| m == created_by) {
            member_ids.push(created_by.to_string());
        }
        member_ids.sort();
        member_ids.dedup();

        match params.chat_type {
            ChatType::Direct => {
                if member_ids.len() != 2 {
                    return Err(ChatError::Validation(
                        "direct chats require exactly 2 members".to_string(),
                    ));
                }
            }
            ChatType::Group | ChatType::Channel => {
                if params.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                    return Err(ChatError::Validation(
                        "group and channel chats require a name".to_string(),
                    ));
                }
            }
        }

        let direct_key = match params.chat_type {
            ChatType::Direct => Some(direct_pair_key(&member_ids[0], &member_ids[1])),
            _ => None,
        };

        let mut conn = self.db.lock()?;

        if let Some(key) = &direct_key {
            if let Some(existing) = self.find_direct_chat(&conn, key)? {
                return Ok(existing);
            }
        }

        let now = now_ms();
        let chat_id = uuid::Uuid::new_v4().to_string();
        let is_private = params.chat_type == ChatType::Direct;

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO chats (id, chat_type, name, description, created_by, direct_key, \
                 is_private, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                chat_id,
                params.chat_type.as_str(),
                params.name,
                params.description,
                created_by,
                direct_key,
                is_private as i64,
                now,
                now
            ],
        );

        match inserted {
            Ok(_) => {}
            // Lost the direct-creation race: another request inserted the
            // same pair between our lookup and insert. Return theirs.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation && direct_key.is_some() =>
            {
                drop(tx);
                let key = direct_key.as_deref().unwrap_or_default();
                if let Some(existing) = self.find_direct_chat(&conn, key)? {
                    return Ok(existing);
                }
                return Err(ChatError::Internal(
                    "direct chat vanished after constraint conflict".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        for member in &member_ids {
            let role = if member == created_by {
                MemberRole::Admin
            } else {
                MemberRole::Member
            };
            tx.execute(
                "INSERT INTO chat_members (chat_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, member, role.as_str(), now],
            )?;
        }
        tx.commit()?;

        info!(chat_id = %chat_id, chat_type = params.chat_type.as_str(), "Chat created");
        load_chat(&conn, &chat_id)
    }

    /// Look up an existing direct chat by its normalized pair key. An
    /// archived thread is revived rather than duplicated, keeping the pair
    /// key unique while honoring idempotent creation.
    fn find_direct_chat(&self, conn: &Connection, key: &str) -> ChatResult<Option<Chat>> {
        let chat_id: Option<String> = conn
            .query_row(
                "SELECT id FROM chats WHERE direct_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(chat_id) = chat_id else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE chats SET is_archived = 0, archived_at = NULL, archived_by = NULL, updated_at = ?1
             WHERE id = ?2 AND is_archived = 1",
            params![now_ms(), chat_id],
        )?;

        load_chat(conn, &chat_id).map(Some)
    }

    /// Chats the caller actively belongs to, excluding archived threads,
    /// most recent activity first (threads with no messages yet sort by
    /// their own update time).
    pub fn get_user_chats(&self, user_id: &str) -> ChatResult<Vec<Chat>> {
        let conn = self.db.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats c
             JOIN chat_members m ON m.chat_id = c.id
             WHERE m.user_id = ?1 AND m.is_active = 1 AND c.is_archived = 0
             ORDER BY COALESCE(c.last_message_at, c.updated_at) DESC, c.updated_at DESC"
        ))?;

        let ids: Vec<String> = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;

        let mut chats = Vec::with_capacity(ids.len());
        for id in ids {
            chats.push(load_chat(&conn, &id)?);
        }
        Ok(chats)
    }

    /// Fetch a single chat. Existence and membership checks are fused: a
    /// non-member cannot distinguish "no such chat" from "not yours".
    pub fn get_chat_by_id(&self, chat_id: &str, user_id: &str) -> ChatResult<Chat> {
        let conn = self.db.lock()?;
        require_active_member(&conn, chat_id, user_id)?;
        load_chat(&conn, chat_id)
    }

    /// Update chat metadata. Requires admin or moderator role.
    pub fn update_chat(
        &self,
        chat_id: &str,
        user_id: &str,
        params: UpdateChatParams,
    ) -> ChatResult<Chat> {
        let conn = self.db.lock()?;
        require_role(&conn, chat_id, user_id, &[MemberRole::Admin, MemberRole::Moderator])?;

        conn.execute(
            "UPDATE chats SET
                 name = COALESCE(?1, name),
                 description = COALESCE(?2, description),
                 avatar_url = COALESCE(?3, avatar_url),
                 updated_at = ?4
             WHERE id = ?5",
            params![params.name, params.description, params.avatar_url, now_ms(), chat_id],
        )?;

        load_chat(&conn, chat_id)
    }

    /// Add a member. Direct chats reject membership mutation outright: the
    /// pair is the thread's identity.
    pub fn add_member(
        &self,
        chat_id: &str,
        user_id: &str,
        new_member: &str,
        role: MemberRole,
    ) -> ChatResult<Chat> {
        let conn = self.db.lock()?;
        let chat_type =
            require_role(&conn, chat_id, user_id, &[MemberRole::Admin, MemberRole::Moderator])?;

        if chat_type == ChatType::Direct {
            return Err(ChatError::InvalidOperation(
                "cannot add members to a direct chat".to_string(),
            ));
        }

        let now = now_ms();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT is_active FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, new_member],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(1) => return Err(ChatError::AlreadyMember),
            Some(_) => {
                // Former member rejoining: reuse the historical row.
                conn.execute(
                    "UPDATE chat_members SET is_active = 1, left_at = NULL, role = ?1, joined_at = ?2
                     WHERE chat_id = ?3 AND user_id = ?4",
                    params![role.as_str(), now, chat_id, new_member],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO chat_members (chat_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
                    params![chat_id, new_member, role.as_str(), now],
                )?;
            }
        }

        conn.execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![now, chat_id],
        )?;

        load_chat(&conn, chat_id)
    }

    /// Soft-remove a member: the row stays with `is_active = 0` and a
    /// `left_at` timestamp, preserving historical membership.
    pub fn remove_member(&self, chat_id: &str, user_id: &str, member: &str) -> ChatResult<Chat> {
        let conn = self.db.lock()?;
        let chat_type =
            require_role(&conn, chat_id, user_id, &[MemberRole::Admin, MemberRole::Moderator])?;

        if chat_type == ChatType::Direct {
            return Err(ChatError::InvalidOperation(
                "cannot remove members from a direct chat".to_string(),
            ));
        }

        let now = now_ms();
        let changed = conn.execute(
            "UPDATE chat_members SET is_active = 0, left_at = ?1
             WHERE chat_id = ?2 AND user_id = ?3 AND is_active = 1",
            params![now, chat_id, member],
        )?;
        if changed == 0 {
            return Err(ChatError::NotFoundOrForbidden);
        }

        conn.execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![now, chat_id],
        )?;

        load_chat(&conn, chat_id)
    }

    /// Archive or unarchive a chat. Reversible metadata, unlike deletion.
    pub fn set_archived(&self, chat_id: &str, user_id: &str, archived: bool) -> ChatResult<Chat> {
        let conn = self.db.lock()?;
        require_role(&conn, chat_id, user_id, &[MemberRole::Admin, MemberRole::Moderator])?;

        let now = now_ms();
        if archived {
            conn.execute(
                "UPDATE chats SET is_archived = 1, archived_at = ?1, archived_by = ?2, updated_at = ?1
                 WHERE id = ?3",
                params![now, user_id, chat_id],
            )?;
        } else {
            conn.execute(
                "UPDATE chats SET is_archived = 0, archived_at = NULL, archived_by = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![now, chat_id],
            )?;
        }

        load_chat(&conn, chat_id)
    }

    /// Hard-delete a chat and everything in it. Admin only. Messages go
    /// first so no message ever references a missing chat.
    pub fn delete_chat(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        let mut conn = self.db.lock()?;
        require_role(&conn, chat_id, user_id, &[MemberRole::Admin])?;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM message_seen WHERE message_id IN (SELECT id FROM messages WHERE chat_id = ?1)",
            params![chat_id],
        )?;
        tx.execute(
            "DELETE FROM message_reactions WHERE message_id IN (SELECT id FROM messages WHERE chat_id = ?1)",
            params![chat_id],
        )?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM chat_members WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        tx.commit()?;

        info!(chat_id = %chat_id, deleted_by = %user_id, "Chat deleted");
        Ok(())
    }

    /// Case-insensitive substring search over the caller's active,
    /// non-archived chats, capped at 20 results.
    pub fn search_chats(&self, user_id: &str, query: &str) -> ChatResult<Vec<Chat>> {
        let conn = self.db.lock()?;
        let pattern = format!("%{}%", query.to_lowercase());

        let mut stmt = conn.prepare(
            "SELECT c.id FROM chats c
             JOIN chat_members m ON m.chat_id = c.id
             WHERE m.user_id = ?1 AND m.is_active = 1 AND c.is_archived = 0
               AND (LOWER(COALESCE(c.name, '')) LIKE ?2 OR LOWER(COALESCE(c.description, '')) LIKE ?2)
             ORDER BY COALESCE(c.last_message_at, c.updated_at) DESC
             LIMIT ?3",
        )?;

        let ids: Vec<String> = stmt
            .query_map(params![user_id, pattern, SEARCH_RESULT_CAP], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<_, _>>()?;

        let mut chats = Vec::with_capacity(ids.len());
        for id in ids {
            chats.push(load_chat(&conn, &id)?);
        }
        Ok(chats)
    }
}

/// Membership gate shared by read paths. Fails the same way for a missing
/// chat and for a chat the caller does not actively belong to.
pub(crate) fn require_active_member(
    conn: &Connection,
    chat_id: &str,
    user_id: &str,
) -> ChatResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM chats c
             JOIN chat_members m ON m.chat_id = c.id
             WHERE c.id = ?1 AND m.user_id = ?2 AND m.is_active = 1",
            params![chat_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    found.map(|_| ()).ok_or(ChatError::NotFoundOrForbidden)
}

/// Role gate for mutations. The role check rides in the same query as the
/// existence check, so a permission probe learns nothing about whether the
/// chat exists. Returns the chat type for follow-up structural checks.
fn require_role(
    conn: &Connection,
    chat_id: &str,
    user_id: &str,
    roles: &[MemberRole],
) -> ChatResult<ChatType> {
    let role_list = roles
        .iter()
        .map(|r| format!("'{}'", r.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let chat_type: Option<String> = conn
        .query_row(
            &format!(
                "SELECT c.chat_type FROM chats c
                 JOIN chat_members m ON m.chat_id = c.id
                 WHERE c.id = ?1 AND m.user_id = ?2 AND m.is_active = 1 AND m.role IN ({role_list})"
            ),
            params![chat_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    chat_type
        .and_then(|t| ChatType::from_str(&t))
        .ok_or(ChatError::NotFoundOrForbidden)
}

/// Load a full chat document, members included. No access check; callers
/// gate first.
pub(crate) fn load_chat(conn: &Connection, chat_id: &str) -> ChatResult<Chat> {
    let mut chat = conn
        .query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1"),
            params![chat_id],
            |row| {
                let chat_type: String = row.get(1)?;
                let last_message_id: Option<String> = row.get(7)?;
                let last_message = last_message_id.map(|message_id| {
                    Ok::<_, rusqlite::Error>(LastMessage {
                        message_id,
                        sender_id: row.get(8)?,
                        timestamp: row.get(9)?,
                        preview: row.get(10)?,
                    })
                });
                Ok(Chat {
                    id: row.get(0)?,
                    chat_type: ChatType::from_str(&chat_type).unwrap_or(ChatType::Group),
                    name: row.get(2)?,
                    description: row.get(3)?,
                    avatar_url: row.get(4)?,
                    created_by: row.get(5)?,
                    members: Vec::new(),
                    message_count: row.get(6)?,
                    last_message: last_message.transpose()?,
                    archived: ArchiveState {
                        is_archived: row.get::<_, i64>(11)? == 1,
                        archived_at: row.get(12)?,
                        archived_by: row.get(13)?,
                    },
                    settings: ChatSettings {
                        is_private: row.get::<_, i64>(14)? == 1,
                        allow_invites: row.get::<_, i64>(15)? == 1,
                        mute_notifications: row.get::<_, i64>(16)? == 1,
                    },
                    created_at: row.get(17)?,
                    updated_at: row.get(18)?,
                })
            },
        )
        .optional()?
        .ok_or(ChatError::NotFoundOrForbidden)?;

    let mut stmt = conn.prepare(
        "SELECT user_id, role, joined_at, is_active, left_at FROM chat_members
         WHERE chat_id = ?1 ORDER BY joined_at ASC",
    )?;
    let members: Vec<ChatMember> = stmt
        .query_map(params![chat_id], |row| {
            let role: String = row.get(1)?;
            Ok(ChatMember {
                user_id: row.get(0)?,
                role: MemberRole::from_str(&role).unwrap_or(MemberRole::Member),
                joined_at: row.get(2)?,
                is_active: row.get::<_, i64>(3)? == 1,
                left_at: row.get(4)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    chat.members = members;
    Ok(chat)
}
