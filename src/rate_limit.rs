use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window of failed login attempts per key (process local).
#[derive(Clone)]
pub struct LoginThrottle {
    failures: Arc<DashMap<String, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl LoginThrottle {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { failures: Arc::new(DashMap::new()), limit, window }
    }

    fn key(username: &str, ip: &str) -> String {
        format!("{}@{ip}", username.to_ascii_lowercase())
    }

    /// True while the key is under its failure budget.
    pub fn allows(&self, username: &str, ip: &str) -> bool {
        let now = Instant::now();
        let Some(mut entry) = self.failures.get_mut(&Self::key(username, ip)) else { return true };
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= self.window { entry.pop_front(); } else { break; }
        }
        entry.len() < self.limit
    }

    pub fn record_failure(&self, username: &str, ip: &str) {
        self.failures.entry(Self::key(username, ip)).or_default().push_back(Instant::now());
    }

    /// A successful login wipes the key's history.
    pub fn reset(&self, username: &str, ip: &str) {
        self.failures.remove(&Self::key(username, ip));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_and_resets() {
        let t = LoginThrottle::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(t.allows("Admin", "1.2.3.4"));
            t.record_failure("Admin", "1.2.3.4");
        }
        assert!(!t.allows("admin", "1.2.3.4"));
        assert!(t.allows("admin", "5.6.7.8"));
        t.reset("admin", "1.2.3.4");
        assert!(t.allows("admin", "1.2.3.4"));
    }

    #[test]
    fn window_expiry_frees_budget() {
        let t = LoginThrottle::new(1, Duration::from_millis(20));
        t.record_failure("u", "ip");
        assert!(!t.allows("u", "ip"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(t.allows("u", "ip"));
    }
}
