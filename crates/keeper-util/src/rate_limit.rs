//! Rate limiting utilities

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Fixed-window limiter, one window per key.
///
/// The daemon keys request limits by connection and password attempts by
/// peer uid, so reconnecting does not reset the attempt budget.
#[derive(Debug)]
pub struct RateLimiter<K = ClientId> {
    max_per_window: u32,
    window: Duration,
    clients: HashMap<K, Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            clients: HashMap::new(),
        }
    }

    /// Record one attempt. Returns `false` if the client is over its limit.
    pub fn check(&mut self, client_id: &K) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&mut self, client_id: &K, now: Instant) -> bool {
        let window = self.clients.entry(client_id.clone()).or_insert(Window {
            started: now,
            used: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.used = 0;
        }

        if window.used < self.max_per_window {
            window.used += 1;
            true
        } else {
            false
        }
    }

    /// Time until the client's window resets, zero if not limited
    pub fn retry_after(&self, client_id: &K) -> Duration {
        match self.clients.get(client_id) {
            Some(w) if w.used >= self.max_per_window => {
                self.window.saturating_sub(w.started.elapsed())
            }
            _ => Duration::ZERO,
        }
    }

    pub fn remove_client(&mut self, client_id: &K) {
        self.clients.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_within_window() {
        let mut limiter: RateLimiter = RateLimiter::new(3, Duration::from_secs(60));
        let client = ClientId::new();

        for _ in 0..3 {
            assert!(limiter.check(&client));
        }
        assert!(!limiter.check(&client));
        assert!(limiter.retry_after(&client) > Duration::ZERO);
    }

    #[test]
    fn window_resets() {
        let mut limiter: RateLimiter = RateLimiter::new(1, Duration::from_secs(10));
        let client = ClientId::new();
        let start = Instant::now();

        assert!(limiter.check_at(&client, start));
        assert!(!limiter.check_at(&client, start + Duration::from_secs(5)));
        assert!(limiter.check_at(&client, start + Duration::from_secs(10)));
    }

    #[test]
    fn clients_are_independent() {
        let mut limiter: RateLimiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = ClientId::new();
        let b = ClientId::new();

        assert!(limiter.check(&a));
        assert!(!limiter.check(&a));
        assert!(limiter.check(&b));

        limiter.remove_client(&a);
        assert!(limiter.check(&a));
        assert!(limiter.retry_after(&b) > Duration::ZERO);
    }

    #[test]
    fn keyed_by_uid() {
        let mut limiter: RateLimiter<Option<u32>> = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check(&Some(1000)));
        assert!(limiter.check(&Some(1000)));
        assert!(!limiter.check(&Some(1000)));
        assert!(limiter.check(&None));
    }
}
