/// Storage key prefix for per-conversation offline queues
pub const QUEUE_KEY_PREFIX: &str = "offline_queue::";

/// Storage key prefix for per-workspace sessions
pub const SESSION_KEY_PREFIX: &str = "session::";

/// Storage key for the cached contact id (global to the profile)
pub const IDENTITY_KEY: &str = "identity::contactId";

/// Tag passed to the host's background-sync registration
pub const BACKGROUND_SYNC_TAG: &str = "palaver-pending-messages";

/// Default session lifetime in seconds (30 minutes)
pub const DEFAULT_SESSION_DURATION_SECS: u64 = 1800;

/// Default threshold below which the session is in the warning state (2 minutes)
pub const DEFAULT_WARNING_THRESHOLD_SECS: u64 = 120;

/// Default threshold below which an active user is auto-renewed (5 minutes)
pub const DEFAULT_RENEWAL_THRESHOLD_SECS: u64 = 300;

/// Default window within which activity counts as "recent" for auto-renewal
pub const DEFAULT_ACTIVITY_WINDOW_SECS: u64 = 60;

/// Default interval between session expiry checks
pub const DEFAULT_SESSION_POLL_SECS: u64 = 10;

/// Default send-path rate limit: attempts per window
pub const DEFAULT_RATE_MAX_ATTEMPTS: usize = 10;

/// Default send-path rate limit window in milliseconds
pub const DEFAULT_RATE_WINDOW_MS: u64 = 60_000;

/// Default timeout for a single publish during a drain
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Maximum message content size in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;
