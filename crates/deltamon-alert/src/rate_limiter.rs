//! Sliding-window rate limiting for alerts.
//!
//! Counts events in a trailing window (one hour for the alert cap). Time is
//! passed in explicitly so decisions are reproducible in tests.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::warn;

/// Sliding-window event counter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Maximum events per window.
    max_events: u32,
    /// Window length.
    window: Duration,
    /// Timestamps of events inside the window, oldest first.
    timestamps: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `max_events` - Maximum events per window
    /// * `window` - Window length
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window,
            timestamps: VecDeque::with_capacity(max_events as usize),
        }
    }

    /// Limiter with a one hour window.
    pub fn hourly(max_events: u32) -> Self {
        Self::new(max_events, Duration::hours(1))
    }

    /// Change the cap without losing recorded events.
    pub fn set_max_events(&mut self, max_events: u32) {
        self.max_events = max_events;
    }

    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    /// Check if another event fits in the window ending at `now`.
    pub fn can_accept(&mut self, now: DateTime<Utc>) -> bool {
        self.cleanup(now);
        self.timestamps.len() < self.max_events as usize
    }

    /// Record an event at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.cleanup(now);
        self.timestamps.push_back(now);

        if self.timestamps.len() >= self.max_events as usize {
            warn!(
                count = self.timestamps.len(),
                max = self.max_events,
                "Alert rate limit reached"
            );
        }
    }

    /// Events inside the window ending at `now`.
    pub fn current_count(&mut self, now: DateTime<Utc>) -> u32 {
        self.cleanup(now);
        self.timestamps.len() as u32
    }

    pub fn remaining_capacity(&mut self, now: DateTime<Utc>) -> u32 {
        self.max_events.saturating_sub(self.current_count(now))
    }

    fn cleanup(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while self.timestamps.front().is_some_and(|&t| t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Reset rate limiter state.
    pub fn reset(&mut self) {
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_rate_limiter_basic() {
        let mut limiter = RateLimiter::hourly(10);
        let now = t0();

        assert!(limiter.can_accept(now));
        for i in 0..5 {
            limiter.record(now + Duration::minutes(i));
        }

        assert!(limiter.can_accept(now + Duration::minutes(5)));
        assert_eq!(limiter.current_count(now + Duration::minutes(5)), 5);
        assert_eq!(limiter.remaining_capacity(now + Duration::minutes(5)), 5);
    }

    #[test]
    fn test_rate_limiter_at_limit() {
        let mut limiter = RateLimiter::hourly(3);
        let now = t0();
        for _ in 0..3 {
            limiter.record(now);
        }
        assert!(!limiter.can_accept(now + Duration::minutes(59)));
        assert_eq!(limiter.remaining_capacity(now), 0);
    }

    #[test]
    fn test_window_slides() {
        let mut limiter = RateLimiter::hourly(2);
        let now = t0();
        limiter.record(now);
        limiter.record(now + Duration::minutes(30));
        assert!(!limiter.can_accept(now + Duration::minutes(59)));

        // The first event leaves the window after exactly one hour.
        assert!(limiter.can_accept(now + Duration::hours(1)));
        assert_eq!(limiter.current_count(now + Duration::hours(1)), 1);
    }

    #[test]
    fn test_lowering_cap_applies_immediately() {
        let mut limiter = RateLimiter::hourly(5);
        let now = t0();
        limiter.record(now);
        limiter.record(now);
        limiter.set_max_events(2);
        assert!(!limiter.can_accept(now));
        limiter.reset();
        assert!(limiter.can_accept(now));
    }
}
