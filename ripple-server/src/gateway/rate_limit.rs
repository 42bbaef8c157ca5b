use dashmap::DashMap;

/// Per-user fixed-window event counter. Exceeding the budget rejects the
/// triggering event; it never disconnects the socket.
pub struct RateLimiter {
    windows: DashMap<String, (i64, u32)>,
    max_events: u32,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(max_events: u32, window_ms: i64) -> Self {
        Self {
            windows: DashMap::new(),
            max_events,
            window_ms,
        }
    }

    /// Count one event for `user_id` at `now_ms`. Returns false when the
    /// event exceeds the window budget and must be rejected.
    pub fn check(&self, user_id: &str, now_ms: i64) -> bool {
        let mut entry = self
            .windows
            .entry(user_id.to_string())
            .or_insert((now_ms, 0));
        let (window_start, count) = *entry;

        if now_ms - window_start >= self.window_ms {
            *entry = (now_ms, 1);
            return true;
        }

        if count >= self.max_events {
            return false;
        }

        *entry = (window_start, count + 1);
        true
    }

    /// Drop a user's window, e.g. when their last connection goes away.
    pub fn forget(&self, user_id: &str) {
        self.windows.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, 60_000);
        assert!(limiter.check("u1", 0));
        assert!(limiter.check("u1", 10));
        assert!(limiter.check("u1", 20));
        assert!(!limiter.check("u1", 30));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(2, 60_000);
        assert!(limiter.check("u1", 0));
        assert!(limiter.check("u1", 1));
        assert!(!limiter.check("u1", 2));
        // New window
        assert!(limiter.check("u1", 60_000));
        assert!(limiter.check("u1", 60_001));
        assert!(!limiter.check("u1", 60_002));
    }

    #[test]
    fn test_users_are_isolated() {
        let limiter = RateLimiter::new(1, 60_000);
        assert!(limiter.check("u1", 0));
        assert!(!limiter.check("u1", 1));
        assert!(limiter.check("u2", 1));
    }

    #[test]
    fn test_forget_clears_window() {
        let limiter = RateLimiter::new(1, 60_000);
        assert!(limiter.check("u1", 0));
        assert!(!limiter.check("u1", 1));
        limiter.forget("u1");
        assert!(limiter.check("u1", 2));
    }
}
