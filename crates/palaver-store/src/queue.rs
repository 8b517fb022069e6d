//! Durable per-conversation FIFO of messages that could not be sent.
//!
//! Each conversation owns one storage key holding a JSON array of
//! [`QueuedMessage`] in enqueue order. Conversation history must replay in
//! the order the user composed it, so order is preserved end to end.
//!
//! Persistence failures never escape this type: a corrupt payload reads as
//! an empty queue (losing unsent drafts beats crashing the widget), and
//! write errors are logged and swallowed.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use palaver_shared::constants::QUEUE_KEY_PREFIX;
use palaver_shared::{ConversationId, MessageId};

use crate::kv::KeyValueStore;
use crate::models::QueuedMessage;

pub struct OfflineMessageQueue {
    store: Arc<dyn KeyValueStore>,
}

impl OfflineMessageQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(conversation_id: &ConversationId) -> String {
        format!("{QUEUE_KEY_PREFIX}{conversation_id}")
    }

    fn load(&self, conversation_id: &ConversationId) -> Vec<QueuedMessage> {
        let key = Self::key(conversation_id);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(%conversation_id, error = %e, "failed to read offline queue");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(%conversation_id, error = %e, "corrupt offline queue payload, treating as empty");
                Vec::new()
            }
        }
    }

    fn save(&self, conversation_id: &ConversationId, entries: &[QueuedMessage]) {
        let key = Self::key(conversation_id);
        let result = if entries.is_empty() {
            self.store.remove(&key)
        } else {
            match serde_json::to_string(entries) {
                Ok(raw) => self.store.set(&key, &raw),
                Err(e) => {
                    warn!(%conversation_id, error = %e, "failed to serialize offline queue");
                    return;
                }
            }
        };

        if let Err(e) = result {
            warn!(%conversation_id, error = %e, "failed to write offline queue");
        }
    }

    /// Append a message to its conversation's queue. Never blocks, never
    /// deduplicates; dedup happens at drain time via the message id.
    pub fn enqueue(&self, message: QueuedMessage) {
        let conversation_id = message.conversation_id;
        let mut entries = self.load(&conversation_id);
        entries.push(message);
        self.save(&conversation_id, &entries);
    }

    /// All queued messages, oldest first. Scoped to one conversation when
    /// `conversation_id` is given; otherwise grouped by conversation in key
    /// order, FIFO within each.
    pub fn list(&self, conversation_id: Option<&ConversationId>) -> Vec<QueuedMessage> {
        match conversation_id {
            Some(id) => self.load(id),
            None => self
                .conversations()
                .iter()
                .flat_map(|id| self.load(id))
                .collect(),
        }
    }

    /// Remove one message by id. Removing an absent id is a no-op.
    pub fn remove(&self, conversation_id: &ConversationId, message_id: &MessageId) {
        let mut entries = self.load(conversation_id);
        let before = entries.len();
        entries.retain(|m| m.id != *message_id);
        if entries.len() != before {
            self.save(conversation_id, &entries);
        }
    }

    /// Drop all queued messages, or only one conversation's.
    pub fn clear(&self, conversation_id: Option<&ConversationId>) {
        match conversation_id {
            Some(id) => self.save(id, &[]),
            None => {
                for id in self.conversations() {
                    self.save(&id, &[]);
                }
            }
        }
    }

    /// Persist a bumped attempt count after a failed drain attempt.
    pub fn increment_attempt(&self, conversation_id: &ConversationId, message_id: &MessageId) {
        let mut entries = self.load(conversation_id);
        let mut changed = false;
        for entry in &mut entries {
            if entry.id == *message_id {
                entry.attempt_count += 1;
                changed = true;
            }
        }
        if changed {
            self.save(conversation_id, &entries);
        }
    }

    /// Conversations that currently have queued messages.
    pub fn conversations(&self) -> Vec<ConversationId> {
        let keys = match self.store.keys_with_prefix(QUEUE_KEY_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to enumerate offline queues");
                return Vec::new();
            }
        };

        keys.iter()
            .filter_map(|key| {
                let suffix = key.strip_prefix(QUEUE_KEY_PREFIX)?;
                match Uuid::parse_str(suffix) {
                    Ok(uuid) => Some(ConversationId(uuid)),
                    Err(_) => {
                        warn!(%key, "ignoring offline queue key with unparsable conversation id");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn has_queued(&self) -> bool {
        self.count() > 0
    }

    pub fn count(&self) -> usize {
        self.conversations()
            .iter()
            .map(|id| self.load(id).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn queue() -> OfflineMessageQueue {
        OfflineMessageQueue::new(Arc::new(MemoryStore::new()))
    }

    fn message(conversation_id: ConversationId, content: &str) -> QueuedMessage {
        QueuedMessage::new(conversation_id, content, Vec::new())
    }

    #[test]
    fn lists_in_enqueue_order() {
        let queue = queue();
        let conv = ConversationId::new();

        queue.enqueue(message(conv, "first"));
        queue.enqueue(message(conv, "second"));
        queue.enqueue(message(conv, "third"));

        let contents: Vec<_> = queue
            .list(Some(&conv))
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_is_idempotent_and_order_preserving() {
        let queue = queue();
        let conv = ConversationId::new();

        let a = message(conv, "a");
        let b = message(conv, "b");
        let c = message(conv, "c");
        let b_id = b.id;

        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        queue.remove(&conv, &b_id);
        queue.remove(&conv, &b_id);

        let contents: Vec<_> = queue
            .list(Some(&conv))
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "c"]);
    }

    #[test]
    fn corrupt_payload_reads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        let conv = ConversationId::new();
        store
            .set(&format!("{QUEUE_KEY_PREFIX}{conv}"), "not valid json")
            .unwrap();

        let queue = OfflineMessageQueue::new(store);
        assert!(queue.list(Some(&conv)).is_empty());
        assert!(!queue.has_queued());
    }

    #[test]
    fn clear_scopes_to_one_conversation() {
        let queue = queue();
        let conv_a = ConversationId::new();
        let conv_b = ConversationId::new();

        queue.enqueue(message(conv_a, "a1"));
        queue.enqueue(message(conv_b, "b1"));

        queue.clear(Some(&conv_a));
        assert!(queue.list(Some(&conv_a)).is_empty());
        assert_eq!(queue.list(Some(&conv_b)).len(), 1);

        queue.clear(None);
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn increment_attempt_persists() {
        let queue = queue();
        let conv = ConversationId::new();
        let msg = message(conv, "stuck");
        let id = msg.id;

        queue.enqueue(msg);
        queue.increment_attempt(&conv, &id);
        queue.increment_attempt(&conv, &id);

        assert_eq!(queue.list(Some(&conv))[0].attempt_count, 2);
    }

    #[test]
    fn counts_across_conversations() {
        let queue = queue();
        let conv_a = ConversationId::new();
        let conv_b = ConversationId::new();

        queue.enqueue(message(conv_a, "a1"));
        queue.enqueue(message(conv_a, "a2"));
        queue.enqueue(message(conv_b, "b1"));

        assert!(queue.has_queued());
        assert_eq!(queue.count(), 3);
        assert_eq!(queue.conversations().len(), 2);
        assert_eq!(queue.list(None).len(), 3);
    }
}
