//! # Rate Limiting
//!
//! Bounds verification attempts per identifier inside a rolling window so a
//! stolen member id cannot be brute-forced through the code space.
//!
//! The policy is a window-with-reset, not a sliding log: the first attempt
//! opens a window, attempts inside it are counted, and the first attempt
//! after expiry resets the window to a count of one. A denied attempt does
//! not consume a slot.
//!
//! Window state lives in a keyed in-memory map guarded by a mutex, owned by
//! the shared application state and handed to callers explicitly. That makes
//! the read-modify-write atomic per process; deployments running more than
//! one server process must move the window state into the shared store
//! instead.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
}

struct RateWindow {
    count: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `identifier` may act right now. Counts the attempt when
    /// allowed; denials leave the window untouched.
    pub fn check(&self, identifier: &str) -> bool {
        self.check_at(identifier, Instant::now())
    }

    /// Slots left in the active window, without consuming one.
    pub fn remaining(&self, identifier: &str) -> u32 {
        self.remaining_at(identifier, Instant::now())
    }

    fn check_at(&self, identifier: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap();

        let window = match windows.entry(identifier.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(RateWindow {
                    count: 1,
                    window_start: now,
                });
                return true;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        if now.duration_since(window.window_start) > self.config.time_window {
            window.count = 1;
            window.window_start = now;
            return true;
        }

        if window.count >= self.config.max_requests {
            return false;
        }

        window.count += 1;
        true
    }

    fn remaining_at(&self, identifier: &str, now: Instant) -> u32 {
        let windows = self.windows.lock().unwrap();

        match windows.get(identifier) {
            Some(window)
                if now.duration_since(window.window_start) <= self.config.time_window =>
            {
                self.config.max_requests.saturating_sub(window.count)
            }
            _ => self.config.max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            time_window: Duration::from_secs(window_seconds),
        })
    }

    #[test]
    fn test_allows_up_to_the_limit() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        let results: Vec<bool> = (0..4).map(|_| limiter.check_at("m-1", now)).collect();
        assert_eq!(results, [true, true, true, false]);
    }

    #[test]
    fn test_expired_window_resets() {
        let limiter = limiter(3, 60);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("m-1", start));
        }
        assert!(!limiter.check_at("m-1", start));

        // Exactly at the window edge the window is still active.
        let edge = start + Duration::from_secs(60);
        assert!(!limiter.check_at("m-1", edge));

        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("m-1", later));
        assert_eq!(limiter.remaining_at("m-1", later), 2);
    }

    #[test]
    fn test_denial_does_not_consume() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        assert!(limiter.check_at("m-1", now));
        assert!(limiter.check_at("m-1", now));
        assert!(!limiter.check_at("m-1", now));
        assert!(!limiter.check_at("m-1", now));
        assert_eq!(limiter.remaining_at("m-1", now), 0);
    }

    #[test]
    fn test_remaining_is_read_only() {
        let limiter = limiter(5, 60);
        let now = Instant::now();

        assert_eq!(limiter.remaining_at("m-1", now), 5);
        assert!(limiter.check_at("m-1", now));
        assert_eq!(limiter.remaining_at("m-1", now), 4);
        assert_eq!(limiter.remaining_at("m-1", now), 4);

        // Expired windows report the full budget again.
        assert_eq!(limiter.remaining_at("m-1", now + Duration::from_secs(61)), 5);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.check_at("m-1", now));
        assert!(!limiter.check_at("m-1", now));
        assert!(limiter.check_at("m-2", now));
    }
}
