//! Per-actor fixed-window rate limiting for neutralization.
//!
//! Each admitted call consumes one slot from the actor's current window;
//! a rejected call consumes nothing and causes no state mutation anywhere
//! downstream (the limiter is checked before any store access).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::QuotaConfig;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter keyed by actor ID.
pub struct RateLimiter {
    window: Duration,
    max_per_window: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            window: config.window,
            max_per_window: config.max_per_window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one invocation for this actor. Admission consumes a
    /// slot; rejection leaves the counter untouched.
    pub fn allow(&self, actor_id: &str) -> bool {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let window = windows.entry(actor_id.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.max_per_window {
            debug!(actor_id, count = window.count, "Neutralization quota exhausted");
            return false;
        }

        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(&QuotaConfig {
            window: Duration::from_secs(24 * 60 * 60),
            max_per_window: max,
        })
    }

    #[tokio::test]
    async fn fifty_first_call_is_rejected() {
        let limiter = limiter(50);
        for _ in 0..50 {
            assert!(limiter.allow("actor-1"));
        }
        assert!(!limiter.allow("actor-1"));
        // Still rejected; rejections do not consume or extend anything.
        assert!(!limiter.allow("actor-1"));
    }

    #[tokio::test]
    async fn actors_are_isolated() {
        let limiter = limiter(1);
        assert!(limiter.allow("actor-1"));
        assert!(!limiter.allow("actor-1"));
        assert!(limiter.allow("actor-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_24_hours() {
        let limiter = limiter(2);
        assert!(limiter.allow("actor-1"));
        assert!(limiter.allow("actor-1"));
        assert!(!limiter.allow("actor-1"));

        tokio::time::advance(Duration::from_secs(24 * 60 * 60 + 1)).await;
        assert!(limiter.allow("actor-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_fixed_not_sliding() {
        let limiter = limiter(2);
        assert!(limiter.allow("actor-1"));

        // 23 hours in: still the same window, one slot left.
        tokio::time::advance(Duration::from_secs(23 * 60 * 60)).await;
        assert!(limiter.allow("actor-1"));
        assert!(!limiter.allow("actor-1"));

        // Two hours later the window that started at t=0 has expired.
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        assert!(limiter.allow("actor-1"));
    }
}
