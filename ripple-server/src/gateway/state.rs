use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::rate_limit::RateLimiter;

/// Socket events allowed per user per rate-limit window.
const RATE_LIMIT_EVENTS: u32 = 100;
const RATE_LIMIT_WINDOW_MS: i64 = 60_000;

/// Name of the broadcast room for a chat thread.
pub fn chat_room(chat_id: &str) -> String {
    format!("chat:{}", chat_id)
}

/// Name of a user's personal room.
pub fn user_room(user_id: &str) -> String {
    format!("user:{}", user_id)
}

/// Process-local session registry and room fan-out. Scoped to one gateway
/// instance's lifetime; a multi-instance deployment would put a shared
/// presence store and pub/sub behind this same interface.
pub struct GatewayState {
    /// user_id -> sender channels (supports multiple connections per user)
    clients: DashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    /// room name -> user ids currently joined
    rooms: DashMap<String, HashSet<String>>,
    pub limiter: RateLimiter,
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            limiter: RateLimiter::new(RATE_LIMIT_EVENTS, RATE_LIMIT_WINDOW_MS),
        }
    }

    /// Register a connection for a user.
    pub fn add_client(&self, user_id: String, tx: mpsc::UnboundedSender<String>) {
        self.clients.entry(user_id).or_default().push(tx);
    }

    /// Drop closed channels for a user. Returns true when that was the
    /// user's last connection, in which case their rooms are vacated too.
    pub fn remove_client(&self, user_id: &str) -> bool {
        let mut last = false;
        if let Some(mut entry) = self.clients.get_mut(user_id) {
            entry.retain(|tx| !tx.is_closed());
            if entry.is_empty() {
                drop(entry);
                self.clients.remove(user_id);
                last = true;
            }
        }
        if last {
            self.leave_all_rooms(user_id);
            self.limiter.forget(user_id);
        }
        last
    }

    pub fn join_room(&self, room: &str, user_id: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn leave_room(&self, room: &str, user_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(user_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(room);
            }
        }
    }

    fn leave_all_rooms(&self, user_id: &str) {
        let mut emptied = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(user_id);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for room in emptied {
            self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Send to every user in a room, optionally excluding one (used by
    /// typing relays so the sender never sees their own indicator).
    pub fn broadcast_to_room(&self, room: &str, message: &str, exclude_user_id: Option<&str>) {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return,
        };
        for user_id in members {
            if Some(user_id.as_str()) != exclude_user_id {
                self.send_to_user(&user_id, message);
            }
        }
    }

    /// Broadcast to every connected user (presence changes).
    pub fn broadcast_all(&self, message: &str, exclude_user_id: Option<&str>) {
        for entry in self.clients.iter() {
            if Some(entry.key().as_str()) != exclude_user_id {
                for tx in entry.value().iter() {
                    let _ = tx.send(message.to_string());
                }
            }
        }
    }

    /// Send a message to all of a user's connections.
    pub fn send_to_user(&self, user_id: &str, message: &str) -> bool {
        if let Some(channels) = self.clients.get(user_id) {
            let mut sent = false;
            for tx in channels.iter() {
                if tx.send(message.to_string()).is_ok() {
                    sent = true;
                }
            }
            sent
        } else {
            false
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.clients
            .get(user_id)
            .map(|channels| !channels.is_empty())
            .unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect()
    }
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_client() {
        let state = GatewayState::new();
        let (tx, rx) = mpsc::unbounded_channel();

        state.add_client("user1".to_string(), tx);
        assert!(state.is_online("user1"));
        assert_eq!(state.online_users().len(), 1);

        drop(rx);
        assert!(state.remove_client("user1"));
        assert!(!state.is_online("user1"));
    }

    #[test]
    fn test_room_broadcast_excludes_sender() {
        let state = GatewayState::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        state.add_client("user1".to_string(), tx1);
        state.add_client("user2".to_string(), tx2);
        state.add_client("user3".to_string(), tx3);

        state.join_room("chat:c1", "user1");
        state.join_room("chat:c1", "user2");
        // user3 is online but not in the room

        state.broadcast_to_room("chat:c1", "hello", Some("user1"));

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "hello");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_room_broadcast_reaches_all_connections() {
        let state = GatewayState::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        // Same user, two connections
        state.add_client("user1".to_string(), tx1);
        state.add_client("user1".to_string(), tx2);
        state.join_room("chat:c1", "user1");

        state.broadcast_to_room("chat:c1", "echo", None);

        assert_eq!(rx1.try_recv().unwrap(), "echo");
        assert_eq!(rx2.try_recv().unwrap(), "echo");
    }

    #[test]
    fn test_partial_disconnect_keeps_user_online() {
        let state = GatewayState::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        state.add_client("user1".to_string(), tx1);
        state.add_client("user1".to_string(), tx2);
        state.join_room("chat:c1", "user1");

        drop(rx1);
        assert!(!state.remove_client("user1"));
        assert!(state.is_online("user1"));

        // Still in the room via the surviving connection
        state.broadcast_to_room("chat:c1", "still here", None);
        assert_eq!(rx2.try_recv().unwrap(), "still here");
    }

    #[test]
    fn test_last_disconnect_vacates_rooms() {
        let state = GatewayState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        state.add_client("user1".to_string(), tx);
        state.add_client("user2".to_string(), tx2);
        state.join_room("chat:c1", "user1");
        state.join_room("chat:c1", "user2");

        drop(rx);
        assert!(state.remove_client("user1"));

        state.broadcast_to_room("chat:c1", "who is left", None);
        assert_eq!(rx2.try_recv().unwrap(), "who is left");
    }

    #[test]
    fn test_leave_room() {
        let state = GatewayState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        state.add_client("user1".to_string(), tx);
        state.join_room("chat:c1", "user1");
        state.leave_room("chat:c1", "user1");

        state.broadcast_to_room("chat:c1", "anyone", None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_room_names() {
        assert_eq!(chat_room("c1"), "chat:c1");
        assert_eq!(user_room("u1"), "user:u1");
    }
}
