//! Sliding-window abuse guard on the send path.
//!
//! Every attempt counts against the limit for exactly `time_window` from its
//! own timestamp, never from a bucket boundary, so a burst straddling a
//! boundary cannot double its allowance. Expiry is lazy: state is re-evaluated
//! on each call rather than by a timer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RateLimitConfig;

pub struct RateLimiter {
    config: RateLimitConfig,
    attempts: VecDeque<Instant>,
    limited_since: Option<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            attempts: VecDeque::new(),
            limited_since: None,
        }
    }

    /// Record an attempt and report whether it is allowed.
    ///
    /// Prunes attempts older than the window, appends the current instant,
    /// and allows the action while the in-window count is within
    /// `max_attempts`. Crossing the threshold enters the limited state.
    pub fn check_action(&mut self) -> bool {
        self.check_action_at(Instant::now())
    }

    /// Whether the limiter is currently refusing actions. Re-evaluated on
    /// each call: once enough attempts leave the window (or `reset_after`
    /// elapses), the limited state clears without an explicit reset.
    pub fn is_limited(&mut self) -> bool {
        self.is_limited_at(Instant::now())
    }

    /// Time until the oldest in-window attempt expires. Zero when not
    /// limited.
    pub fn time_remaining(&mut self) -> Duration {
        self.time_remaining_at(Instant::now())
    }

    /// Drop all recorded attempts and leave the limited state immediately.
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.limited_since = None;
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.time_window;
        while let Some(&oldest) = self.attempts.front() {
            if now.duration_since(oldest) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn check_action_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.attempts.push_back(now);

        let allowed = self.attempts.len() <= self.config.max_attempts;
        if !allowed && self.limited_since.is_none() {
            debug!(
                attempts = self.attempts.len(),
                max = self.config.max_attempts,
                "send rate limit reached"
            );
            self.limited_since = Some(now);
        }
        allowed
    }

    pub(crate) fn is_limited_at(&mut self, now: Instant) -> bool {
        if let (Some(since), Some(reset_after)) = (self.limited_since, self.config.reset_after) {
            if now.duration_since(since) >= reset_after {
                self.reset();
                return false;
            }
        }

        self.prune(now);
        if self.limited_since.is_some() && self.attempts.len() < self.config.max_attempts {
            self.limited_since = None;
        }
        self.limited_since.is_some()
    }

    pub(crate) fn time_remaining_at(&mut self, now: Instant) -> Duration {
        if !self.is_limited_at(now) {
            return Duration::ZERO;
        }
        match self.attempts.front() {
            Some(&oldest) => self
                .config
                .time_window
                .saturating_sub(now.duration_since(oldest)),
            None => Duration::ZERO,
        }
    }
}
