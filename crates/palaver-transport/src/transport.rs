//! The pub/sub transport collaborator, seen from the widget's side.
//!
//! The transport's internal protocol is not this crate's business; the
//! widget consumes exactly four things: connect/close, publish, the current
//! raw state, and a stream of raw state changes. Everything else (the
//! normalized state machine, reconnect policy) lives in
//! [`crate::ConnectionMonitor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use palaver_shared::ConversationId;

use crate::messages::OutboundMessage;

/// Connection states as the transport itself reports them.
///
/// Richer than the normalized [`palaver_shared::ConnectionState`]; the
/// mapping between the two is the monitor's job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RawConnectionState {
    /// Handle created, no connect issued yet.
    Initialized,
    Connecting,
    Connected,
    /// Transient drop; the transport is still trying on its own.
    Disconnected,
    /// The transport gave up retrying until explicitly resumed.
    Suspended,
    Closing,
    Closed,
    /// Terminal failure; the handle will refuse further connects.
    Failed,
}

impl std::fmt::Display for RawConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Suspended => "suspended",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Errors surfaced by transport operations.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The publish did not complete within the caller's deadline.
    #[error("Publish timed out")]
    Timeout,

    /// The connection is not usable right now; retry on the next trigger.
    #[error("Connection unavailable: {0}")]
    Unavailable(String),

    /// The transport rejected the payload permanently. Retrying the same
    /// payload can never succeed.
    #[error("Payload rejected: {0}")]
    Rejected(String),

    /// A connect attempt failed outright.
    #[error("Connect failed: {0}")]
    Connect(String),
}

impl TransportError {
    /// Whether a later retry of the same operation can succeed.
    ///
    /// This is the single classification point between transient transport
    /// errors and poisoned payloads.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// The consumed transport interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The transport's current raw state, readable synchronously.
    fn current_state(&self) -> RawConnectionState;

    /// Initiate a connection. Resolution is reported through the state
    /// stream, not the return value.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear down the current handle. Required before reconnecting a
    /// transport that has reached [`RawConnectionState::Failed`].
    async fn close(&self);

    /// Publish one message to a conversation's topic.
    async fn publish(
        &self,
        conversation_id: &ConversationId,
        message: OutboundMessage,
    ) -> Result<(), TransportError>;

    /// Raw state changes, one event per change, never coalesced.
    fn subscribe_states(&self) -> mpsc::UnboundedReceiver<RawConnectionState>;
}
