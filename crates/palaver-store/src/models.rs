use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_shared::{ConversationId, MessageId};

/// A message composed while the transport was unavailable.
///
/// Immutable except `attempt_count`, which is bumped on every failed drain
/// attempt. A new send always mints a new id; content is never rewritten in
/// place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt_count: u32,
}

impl QueuedMessage {
    pub fn new(
        conversation_id: ConversationId,
        content: impl Into<String>,
        attachment_refs: Vec<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            content: content.into(),
            attachment_refs,
            enqueued_at: Utc::now(),
            attempt_count: 0,
        }
    }
}

/// A time-boxed widget session, persisted per workspace.
///
/// `last_activity_at` and `expires_at` move independently: activity is a
/// presence signal only, and never extends the hard expiry on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub csrf_token: String,
}

impl Session {
    /// Create a session starting at `now`, expiring after `duration`.
    pub fn start_at(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + duration,
            csrf_token: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time until expiry, clamped to zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }

    /// Time since the last recorded activity, clamped to zero.
    pub fn idle_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.last_activity_at).to_std().unwrap_or_default()
    }
}
