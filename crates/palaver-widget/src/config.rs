//! Widget configuration loaded from environment variables.
//!
//! All settings have sensible defaults so an embedding application can
//! construct a widget with zero configuration.

use std::time::Duration;

use palaver_shared::constants::{
    DEFAULT_ACTIVITY_WINDOW_SECS, DEFAULT_PUBLISH_TIMEOUT_SECS, DEFAULT_RATE_MAX_ATTEMPTS,
    DEFAULT_RATE_WINDOW_MS, DEFAULT_RENEWAL_THRESHOLD_SECS, DEFAULT_SESSION_DURATION_SECS,
    DEFAULT_SESSION_POLL_SECS, DEFAULT_WARNING_THRESHOLD_SECS,
};

/// Session timing knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard session lifetime from creation or explicit extension.
    /// Env: `PALAVER_SESSION_DURATION_SECS`
    pub duration: Duration,

    /// Remaining time below which the session enters the warning state.
    /// Env: `PALAVER_SESSION_WARNING_SECS`
    pub warning_threshold: Duration,

    /// Remaining time below which an active user is renewed automatically.
    /// Env: `PALAVER_SESSION_RENEWAL_SECS`
    pub renewal_threshold: Duration,

    /// How recent the last activity must be to count for auto-renewal.
    /// Env: `PALAVER_SESSION_ACTIVITY_WINDOW_SECS`
    pub activity_window: Duration,

    /// Interval between expiry checks.
    /// Env: `PALAVER_SESSION_POLL_SECS`
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(DEFAULT_SESSION_DURATION_SECS),
            warning_threshold: Duration::from_secs(DEFAULT_WARNING_THRESHOLD_SECS),
            renewal_threshold: Duration::from_secs(DEFAULT_RENEWAL_THRESHOLD_SECS),
            activity_window: Duration::from_secs(DEFAULT_ACTIVITY_WINDOW_SECS),
            poll_interval: Duration::from_secs(DEFAULT_SESSION_POLL_SECS),
        }
    }
}

/// Send-path rate limiting knobs.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one sliding window.
    /// Env: `PALAVER_RATE_MAX_ATTEMPTS`
    pub max_attempts: usize,

    /// Sliding window length.
    /// Env: `PALAVER_RATE_WINDOW_MS`
    pub time_window: Duration,

    /// Optional hard reset after entering the limited state. `None` relies
    /// purely on the window draining.
    pub reset_after: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RATE_MAX_ATTEMPTS,
            time_window: Duration::from_millis(DEFAULT_RATE_WINDOW_MS),
            reset_after: None,
        }
    }
}

/// Top-level widget configuration.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,

    /// Timeout for a single publish during a drain, independent of both the
    /// session timer and the rate-limit window.
    /// Env: `PALAVER_PUBLISH_TIMEOUT_SECS`
    pub publish_timeout: Duration,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
        }
    }
}

impl WidgetConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_u64("PALAVER_SESSION_DURATION_SECS") {
            config.session.duration = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PALAVER_SESSION_WARNING_SECS") {
            config.session.warning_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PALAVER_SESSION_RENEWAL_SECS") {
            config.session.renewal_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PALAVER_SESSION_ACTIVITY_WINDOW_SECS") {
            config.session.activity_window = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PALAVER_SESSION_POLL_SECS") {
            config.session.poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("PALAVER_RATE_MAX_ATTEMPTS") {
            config.rate_limit.max_attempts = n as usize;
        }
        if let Some(ms) = env_u64("PALAVER_RATE_WINDOW_MS") {
            config.rate_limit.time_window = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("PALAVER_PUBLISH_TIMEOUT_SECS") {
            config.publish_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "invalid value, using default");
            None
        }
    }
}
