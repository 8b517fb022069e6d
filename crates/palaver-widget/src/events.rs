//! Events surfaced to the embedding UI.
//!
//! Everything the UI needs to react to — connection changes, sync progress,
//! session lifecycle, identity gaps — arrives on one stream as a
//! serializable payload. Each widget instance owns its subscriber list;
//! nothing is shared between instances.

use serde::Serialize;
use uuid::Uuid;

use palaver_shared::{ConnectionState, ConversationId, MessageId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WidgetEvent {
    ConnectionChanged {
        state: ConnectionState,
    },
    SyncStarted {
        conversation_id: ConversationId,
    },
    SyncCompleted {
        conversation_id: ConversationId,
    },
    SyncFailed {
        conversation_id: ConversationId,
        error: String,
    },
    MessageDropped {
        conversation_id: ConversationId,
        message_id: MessageId,
        error: String,
    },
    SessionStarted {
        session_id: Uuid,
    },
    SessionRenewed,
    SessionWarning {
        remaining_secs: u64,
    },
    SessionExpired,
    /// No resolvable contact identity; the UI must collect details before
    /// sends are permitted.
    NeedsContactInfo,
    RateLimited {
        retry_in_ms: u64,
    },
}
