//! Drains the offline queue through the transport.
//!
//! A drain is per-conversation and strictly FIFO: sending message 2 before
//! message 1 has succeeded would reorder the conversation for the
//! recipient, which is worse than delaying message 2, so the pass stops at
//! the first transient failure. Delivered entries are removed one at a
//! time, before the next publish, so a crash mid-drain cannot re-send them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use palaver_shared::{ContactId, ConversationId, MessageId};
use palaver_store::{IdentityCache, OfflineMessageQueue, QueuedMessage};
use palaver_transport::{OutboundMessage, Transport, TransportError};

use crate::host::HostEnvironment;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncEvent {
    Started {
        conversation_id: ConversationId,
    },
    Completed {
        conversation_id: ConversationId,
    },
    Failed {
        conversation_id: ConversationId,
        error: String,
    },
    /// A permanently rejected message was dropped so the rest of the queue
    /// can move. Carries the id so a UI can surface it for manual
    /// resolution.
    MessageDropped {
        conversation_id: ConversationId,
        message_id: MessageId,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The conversation's queue is now empty.
    Completed,
    /// A transient failure stopped the pass; entries remain queued.
    Failed,
    /// Another drain for this conversation was already running.
    AlreadySyncing,
    /// Nothing to do: host offline or queue empty.
    Skipped,
}

pub struct SyncCoordinator {
    queue: Arc<OfflineMessageQueue>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostEnvironment>,
    identity: Arc<IdentityCache>,
    publish_timeout: Duration,
    in_flight: Mutex<HashSet<ConversationId>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SyncEvent>>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<OfflineMessageQueue>,
        transport: Arc<dyn Transport>,
        host: Arc<dyn HostEnvironment>,
        identity: Arc<IdentityCache>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            transport,
            host,
            identity,
            publish_timeout,
            in_flight: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().expect("sync lock").push(tx);
        rx
    }

    fn notify(&self, event: SyncEvent) {
        let mut listeners = self.listeners.lock().expect("sync lock");
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn is_syncing(&self, conversation_id: &ConversationId) -> bool {
        self.in_flight
            .lock()
            .expect("sync lock")
            .contains(conversation_id)
    }

    /// Drain every conversation with queued messages. Conversations are
    /// drained one after another; ordering is only guaranteed within each.
    pub async fn sync_all(&self) {
        for conversation_id in self.queue.conversations() {
            self.sync_conversation(conversation_id).await;
        }
    }

    /// One drain pass for one conversation.
    pub async fn sync_conversation(&self, conversation_id: ConversationId) -> SyncOutcome {
        if self.host.is_offline() {
            debug!(%conversation_id, "host reports offline, skipping sync");
            return SyncOutcome::Skipped;
        }

        let pending = self.queue.list(Some(&conversation_id));
        if pending.is_empty() {
            return SyncOutcome::Skipped;
        }

        {
            let mut in_flight = self.in_flight.lock().expect("sync lock");
            if !in_flight.insert(conversation_id) {
                debug!(%conversation_id, "drain already in progress");
                return SyncOutcome::AlreadySyncing;
            }
        }

        let outcome = self.drain(conversation_id, pending).await;

        self.in_flight
            .lock()
            .expect("sync lock")
            .remove(&conversation_id);

        outcome
    }

    async fn drain(
        &self,
        conversation_id: ConversationId,
        pending: Vec<QueuedMessage>,
    ) -> SyncOutcome {
        self.notify(SyncEvent::Started { conversation_id });
        debug!(%conversation_id, pending = pending.len(), "draining offline queue");

        let contact_id = self.identity.load();
        let mut failure: Option<String> = None;

        for message in pending {
            let result = self.publish_one(&conversation_id, &message, &contact_id).await;

            match result {
                Ok(()) => {
                    // Remove before touching the next entry so a crash here
                    // cannot re-send what was already delivered.
                    self.queue.remove(&conversation_id, &message.id);
                }
                Err(e) if e.is_retryable() => {
                    warn!(%conversation_id, message_id = %message.id, error = %e, "drain stopped on transient failure");
                    self.queue.increment_attempt(&conversation_id, &message.id);
                    failure = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    error!(%conversation_id, message_id = %message.id, error = %e, "dropping permanently rejected message");
                    self.queue.remove(&conversation_id, &message.id);
                    self.notify(SyncEvent::MessageDropped {
                        conversation_id,
                        message_id: message.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.queue.list(Some(&conversation_id)).is_empty() {
            self.notify(SyncEvent::Completed { conversation_id });
            SyncOutcome::Completed
        } else {
            self.notify(SyncEvent::Failed {
                conversation_id,
                error: failure.unwrap_or_else(|| "drain incomplete".to_string()),
            });
            SyncOutcome::Failed
        }
    }

    async fn publish_one(
        &self,
        conversation_id: &ConversationId,
        message: &QueuedMessage,
        contact_id: &Option<ContactId>,
    ) -> Result<(), TransportError> {
        let outbound = outbound_from(message, contact_id.clone());
        match timeout(
            self.publish_timeout,
            self.transport.publish(conversation_id, outbound),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Wire frame for a queued message. The queued id rides along so delivery
/// stays deduplicatable when a success acknowledgment is lost.
pub(crate) fn outbound_from(
    message: &QueuedMessage,
    contact_id: Option<ContactId>,
) -> OutboundMessage {
    OutboundMessage {
        message_id: message.id,
        conversation_id: message.conversation_id,
        content: message.content.clone(),
        attachment_refs: message.attachment_refs.clone(),
        contact_id,
        sent_at: message.enqueued_at,
    }
}
