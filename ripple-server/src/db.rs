use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{ChatError, ChatResult};

/// Shared database handle. rusqlite connections are not Sync, so access is
/// serialized through a mutex; every caller holds the lock only for the
/// duration of a single service operation.
pub struct Database(pub Mutex<Connection>);

impl Database {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub fn open(path: &str) -> ChatResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self(Mutex::new(conn)))
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self(Mutex::new(conn)))
    }

    pub fn lock(&self) -> ChatResult<std::sync::MutexGuard<'_, Connection>> {
        self.0
            .lock()
            .map_err(|e| ChatError::Internal(format!("database lock poisoned: {}", e)))
    }
}

fn init_schema(conn: &Connection) -> ChatResult<()> {
    conn.execute_batch(
        "
        -- Chat threads
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            chat_type TEXT CHECK(chat_type IN ('direct', 'group', 'channel')) NOT NULL,
            name TEXT,
            description TEXT,
            avatar_url TEXT,
            created_by TEXT NOT NULL,
            -- sorted member pair, set for direct chats only; the UNIQUE
            -- index is what makes direct-chat creation race-proof
            direct_key TEXT UNIQUE,
            message_count INTEGER NOT NULL DEFAULT 0,
            last_message_id TEXT,
            last_message_sender TEXT,
            last_message_at INTEGER,
            last_message_preview TEXT,
            is_archived INTEGER NOT NULL DEFAULT 0,
            archived_at INTEGER,
            archived_by TEXT,
            is_private INTEGER NOT NULL DEFAULT 0,
            allow_invites INTEGER NOT NULL DEFAULT 1,
            mute_notifications INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Membership records; rows are never deleted, only deactivated
        CREATE TABLE IF NOT EXISTS chat_members (
            chat_id TEXT NOT NULL REFERENCES chats(id),
            user_id TEXT NOT NULL,
            role TEXT CHECK(role IN ('admin', 'moderator', 'member')) NOT NULL DEFAULT 'member',
            joined_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            left_at INTEGER,
            PRIMARY KEY (chat_id, user_id)
        );

        -- Messages; deletion is a soft flag, the row stays for audit
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL REFERENCES chats(id),
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            message_type TEXT CHECK(message_type IN ('text', 'image', 'file', 'audio', 'video', 'system')) NOT NULL DEFAULT 'text',
            attachments TEXT NOT NULL DEFAULT '[]',
            status TEXT CHECK(status IN ('sent', 'delivered', 'read', 'failed')) NOT NULL DEFAULT 'sent',
            reply_to_id TEXT REFERENCES messages(id),
            is_edited INTEGER NOT NULL DEFAULT 0,
            edited_at INTEGER,
            original_content TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            deleted_by TEXT,
            created_at INTEGER NOT NULL
        );

        -- Per-user read receipts
        CREATE TABLE IF NOT EXISTS message_seen (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id TEXT NOT NULL,
            seen_at INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        -- Reactions, toggled on (user, emoji)
        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id TEXT NOT NULL,
            emoji TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages(chat_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_chat_members_user ON chat_members(user_id);
        CREATE INDEX IF NOT EXISTS idx_message_seen_user ON message_seen(user_id);
        ",
    )?;

    Ok(())
}

/// Current time as epoch milliseconds, the timestamp unit used everywhere.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalized key for a two-party chat: both users derive the same key
/// regardless of who initiates, so the UNIQUE column enforces one direct
/// chat per unordered pair.
pub fn direct_pair_key(user_a: &str, user_b: &str) -> String {
    let mut ids = [user_a, user_b];
    ids.sort();
    format!("{}|{}", ids[0], ids[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_pair_key_is_order_independent() {
        assert_eq!(direct_pair_key("alice", "bob"), direct_pair_key("bob", "alice"));
        assert_eq!(direct_pair_key("alice", "bob"), "alice|bob");
    }

    #[test]
    fn test_schema_applies_cleanly() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
