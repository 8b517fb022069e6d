//! Outbound wire payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palaver_shared::{ContactId, ConversationId, MessageId};

/// One chat message as published to the transport.
///
/// `message_id` is the deduplication handle: delivery is at-least-once, and
/// the receiving side drops repeats by id. `contact_id` authenticates the
/// sender once an identity has been resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
    pub contact_id: Option<ContactId>,
    pub sent_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
