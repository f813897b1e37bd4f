//! Multi-tier rate limiter (C3), co-located with the worker it guards.
//!
//! Per spec.md §4.5 / §5 this state is private to one account's worker —
//! nothing here is shared across workers, so plain `Mutex`-guarded
//! `VecDeque`s are sufficient; there is no cross-task contention to design
//! around.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub window: ChronoDuration,
    pub max_events: usize,
}

impl WindowConfig {
    pub fn new(window_seconds: i64, max_events: usize) -> Self {
        Self {
            window: ChronoDuration::seconds(window_seconds),
            max_events,
        }
    }
}

/// A single sliding window of event timestamps.
struct SlidingWindow {
    config: WindowConfig,
    events: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.config.window;
        while self.events.front().is_some_and(|t| *t < cutoff) {
            self.events.pop_front();
        }
    }

    fn allow(&mut self, now: DateTime<Utc>) -> bool {
        self.evict(now);
        self.events.len() < self.config.max_events
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.events.push_back(now);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub hourly: WindowConfig,
    pub daily: WindowConfig,
    pub per_target: WindowConfig,
    pub cooldown_range: (i64, i64),
    pub max_wait: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            hourly: WindowConfig::new(3600, 30),
            daily: WindowConfig::new(86_400, 200),
            per_target: WindowConfig::new(3600, 1),
            cooldown_range: (600, 2400),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Per-account, per-target sliding-window limiter plus soft-block
/// cooldown. One instance lives inside each worker (see
/// [`super::worker::Worker`]); it is never shared.
pub struct RateLimiter {
    config: RateLimiterConfig,
    hourly: Mutex<SlidingWindow>,
    daily: Mutex<SlidingWindow>,
    per_target: Mutex<HashMap<String, SlidingWindow>>,
    cooldown_until: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Acquired,
    TimedOut,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            hourly: Mutex::new(SlidingWindow::new(config.hourly)),
            daily: Mutex::new(SlidingWindow::new(config.daily)),
            per_target: Mutex::new(HashMap::new()),
            cooldown_until: Mutex::new(None),
            config,
        }
    }

    /// Whether an action is allowed right now, without blocking.
    pub fn allow_now(&self, target: &str) -> bool {
        let now = Utc::now();
        if self.in_cooldown(now) {
            return false;
        }
        let hourly_ok = self.hourly.lock().unwrap().allow(now);
        let daily_ok = self.daily.lock().unwrap().allow(now);
        let target_ok = {
            let mut map = self.per_target.lock().unwrap();
            map.entry(target.to_string())
                .or_insert_with(|| SlidingWindow::new(self.config.per_target))
                .allow(now)
        };
        hourly_ok && daily_ok && target_ok
    }

    fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match *self.cooldown_until.lock().unwrap() {
            Some(until) => now < until,
            None => false,
        }
    }

    /// Records that an action was just taken, against every tier.
    pub fn record_event(&self, target: &str) {
        let now = Utc::now();
        self.hourly.lock().unwrap().record(now);
        self.daily.lock().unwrap().record(now);
        self.per_target
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_insert_with(|| SlidingWindow::new(self.config.per_target))
            .record(now);
    }

    /// Engages the cooldown after a platform-reported soft block
    /// (`transient_ui_block`). Duration is randomised within the
    /// configured range so every worker doesn't resume in lockstep.
    pub fn trigger_cooldown(&self) {
        let (low, high) = self.config.cooldown_range;
        let secs = rand::thread_rng().gen_range(low..=high.max(low));
        *self.cooldown_until.lock().unwrap() = Some(Utc::now() + ChronoDuration::seconds(secs));
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        *self.cooldown_until.lock().unwrap()
    }

    /// Blocks until a slot is available or `max_wait_s` elapses, per
    /// spec.md §4.5 "Blocking behaviour". Callers that time out should
    /// surface a retryable `rate_limited` result rather than busy-loop.
    pub async fn wait_for_slot(&self, target: &str) -> WaitOutcome {
        let deadline = tokio::time::Instant::now() + self.config.max_wait;
        loop {
            if self.allow_now(target) {
                return WaitOutcome::Acquired;
            }
            if tokio::time::Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            sleep(Duration::from_millis(250)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_events_to_max() {
        let mut window = SlidingWindow::new(WindowConfig::new(3600, 3));
        let now = Utc::now();
        for _ in 0..3 {
            assert!(window.allow(now));
            window.record(now);
        }
        assert!(!window.allow(now));
    }

    #[test]
    fn events_outside_window_are_evicted() {
        let mut window = SlidingWindow::new(WindowConfig::new(60, 1));
        let now = Utc::now();
        window.record(now - ChronoDuration::seconds(120));
        assert!(window.allow(now));
    }

    #[tokio::test]
    async fn cooldown_blocks_allow_now() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            cooldown_range: (1, 1),
            ..Default::default()
        });
        assert!(limiter.allow_now("alice"));
        limiter.trigger_cooldown();
        assert!(!limiter.allow_now("alice"));
    }

    #[tokio::test]
    async fn hourly_cap_enforced_then_wait_times_out() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            hourly: WindowConfig::new(3600, 1),
            max_wait: Duration::from_millis(300),
            ..Default::default()
        });
        assert!(limiter.allow_now("alice"));
        limiter.record_event("alice");
        assert!(!limiter.allow_now("alice"));
        let outcome = limiter.wait_for_slot("alice").await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn per_target_limits_independent_of_account_window() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            hourly: WindowConfig::new(3600, 100),
            per_target: WindowConfig::new(3600, 1),
            ..Default::default()
        });
        assert!(limiter.allow_now("alice"));
        limiter.record_event("alice");
        assert!(!limiter.allow_now("alice"));
        assert!(limiter.allow_now("bob"));
    }
}
