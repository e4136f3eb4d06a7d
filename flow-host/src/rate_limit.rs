//! Fixed-window admission control for whole-flow runs
//!
//! Each admission key owns one window. When the window has expired it is
//! reset on the next check; otherwise the count is compared to the limit
//! for the trigger's class. Once the table passes [`PRUNE_THRESHOLD`] keys,
//! expired windows are dropped before a new key is inserted.

use crate::config::{RateLimitConfig, WindowLimit};
use flow_api::TriggerType;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Tracked keys above which expired windows are dropped
pub const PRUNE_THRESHOLD: usize = 1_024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    len: Duration,
    count: u32,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.len
    }
}

/// Per-key fixed-window counter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admission key for a run
    pub fn key(flow_id: &str, trigger_type: &TriggerType, selector: Option<&str>) -> String {
        format!("{}:{}:{}", flow_id, trigger_type, selector.unwrap_or(""))
    }

    /// Limit applied to a trigger type
    pub fn limit_for(&self, trigger_type: &TriggerType) -> WindowLimit {
        match trigger_type {
            TriggerType::OnTimer => self.config.timer,
            TriggerType::OnMessage => self.config.message,
            _ => self.config.ui,
        }
    }

    /// Number of admission keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Admit or reject one run for `key`
    pub fn try_acquire(&self, key: &str, trigger_type: &TriggerType) -> bool {
        self.try_acquire_at(key, trigger_type, Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) with an explicit clock
    pub fn try_acquire_at(&self, key: &str, trigger_type: &TriggerType, now: Instant) -> bool {
        let limit = self.limit_for(trigger_type);
        let window_len = Duration::from_secs(limit.window_secs);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= PRUNE_THRESHOLD && !windows.contains_key(key) {
            windows.retain(|_, w| !w.expired(now));
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            len: window_len,
            count: 0,
        });

        if window.expired(now) {
            window.started = now;
            window.len = window_len;
            window.count = 0;
        }

        if window.count >= limit.limit {
            return false;
        }
        window.count += 1;
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_limit_six_per_minute() {
        let limiter = RateLimiter::default();
        let key = RateLimiter::key("f", &TriggerType::OnTimer, None);
        let t0 = Instant::now();

        for i in 0..6 {
            assert!(
                limiter.try_acquire_at(&key, &TriggerType::OnTimer, t0 + Duration::from_secs(i)),
                "call {} should be admitted",
                i + 1
            );
        }
        assert!(!limiter.try_acquire_at(&key, &TriggerType::OnTimer, t0 + Duration::from_secs(59)));
        assert!(limiter.try_acquire_at(&key, &TriggerType::OnTimer, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        let a = RateLimiter::key("f", &TriggerType::OnMessage, Some("a"));
        let b = RateLimiter::key("f", &TriggerType::OnMessage, Some("b"));

        for _ in 0..20 {
            assert!(limiter.try_acquire_at(&a, &TriggerType::OnMessage, t0));
        }
        assert!(!limiter.try_acquire_at(&a, &TriggerType::OnMessage, t0));
        assert!(limiter.try_acquire_at(&b, &TriggerType::OnMessage, t0));
    }

    #[test]
    fn test_ui_limit() {
        let limiter = RateLimiter::default();
        let key = RateLimiter::key("f", &TriggerType::OnClick, Some("btn"));
        let t0 = Instant::now();
        let admitted = (0..40)
            .filter(|_| limiter.try_acquire_at(&key, &TriggerType::OnClick, t0))
            .count();
        assert_eq!(admitted, 30);
    }

    #[test]
    fn test_expired_keys_dropped() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            let key = RateLimiter::key("f", &TriggerType::OnClick, Some(&format!("btn-{}", i)));
            assert!(limiter.try_acquire_at(&key, &TriggerType::OnClick, t0));
        }
        let live = RateLimiter::key("f", &TriggerType::OnTimer, None);
        assert!(limiter.try_acquire_at(&live, &TriggerType::OnTimer, t0));
        assert_eq!(limiter.tracked_keys(), PRUNE_THRESHOLD + 1);

        // UI windows last 10s, the timer window 60s
        let later = t0 + Duration::from_secs(11);
        let fresh = RateLimiter::key("f", &TriggerType::OnClick, Some("fresh"));
        assert!(limiter.try_acquire_at(&fresh, &TriggerType::OnClick, later));
        assert_eq!(limiter.tracked_keys(), 2);

        // the surviving window still counts
        for _ in 0..5 {
            assert!(limiter.try_acquire_at(&live, &TriggerType::OnTimer, later));
        }
        assert!(!limiter.try_acquire_at(&live, &TriggerType::OnTimer, later));
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            RateLimiter::key("flow", &TriggerType::OnClick, Some("btn")),
            "flow:OnClick:btn"
        );
        assert_eq!(RateLimiter::key("flow", &TriggerType::OnTimer, None), "flow:OnTimer:");
    }
}
