//! In-process transport.
//!
//! `LocalTransport` implements [`Transport`] entirely in memory: raw state
//! changes are scripted by the caller, published messages are captured for
//! inspection, and publish failures can be injected. Tests and local
//! development run the whole resilience layer against it without a broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use palaver_shared::ConversationId;

use crate::messages::OutboundMessage;
use crate::transport::{RawConnectionState, Transport, TransportError};

pub struct LocalTransport {
    state: Mutex<RawConnectionState>,
    state_subs: Mutex<Vec<mpsc::UnboundedSender<RawConnectionState>>>,
    published: Mutex<Vec<(ConversationId, OutboundMessage)>>,
    publish_script: Mutex<VecDeque<Result<(), TransportError>>>,
    publish_delay: Mutex<Option<std::time::Duration>>,
    close_count: AtomicUsize,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RawConnectionState::Initialized),
            state_subs: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            publish_script: Mutex::new(VecDeque::new()),
            publish_delay: Mutex::new(None),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Drive the transport to a raw state, notifying state subscribers.
    pub fn set_raw_state(&self, raw: RawConnectionState) {
        {
            let mut state = self.state.lock().expect("transport lock");
            if *state == raw {
                return;
            }
            *state = raw;
        }
        let mut subs = self.state_subs.lock().expect("transport lock");
        subs.retain(|tx| tx.send(raw).is_ok());
    }

    /// Script the outcome of an upcoming publish call. Scripted outcomes
    /// apply to consecutive publishes in order; once the script runs dry,
    /// publishes succeed whenever the transport is connected.
    pub fn script_publish(&self, result: Result<(), TransportError>) {
        self.publish_script
            .lock()
            .expect("transport lock")
            .push_back(result);
    }

    /// Shorthand: fail the next publish with `error`.
    pub fn fail_next_publish(&self, error: TransportError) {
        self.script_publish(Err(error));
    }

    /// Delay every publish, so tests can observe an in-flight drain.
    pub fn set_publish_delay(&self, delay: std::time::Duration) {
        *self.publish_delay.lock().expect("transport lock") = Some(delay);
    }

    /// Everything successfully published so far.
    pub fn published(&self) -> Vec<(ConversationId, OutboundMessage)> {
        self.published.lock().expect("transport lock").clone()
    }

    /// How many times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Relaxed)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn current_state(&self) -> RawConnectionState {
        *self.state.lock().expect("transport lock")
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.set_raw_state(RawConnectionState::Connecting);
        self.set_raw_state(RawConnectionState::Connected);
        Ok(())
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::Relaxed);
        self.set_raw_state(RawConnectionState::Closing);
        self.set_raw_state(RawConnectionState::Closed);
    }

    async fn publish(
        &self,
        conversation_id: &ConversationId,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        let delay = *self.publish_delay.lock().expect("transport lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .publish_script
            .lock()
            .expect("transport lock")
            .pop_front();
        if let Some(Err(error)) = scripted {
            return Err(error);
        }

        if self.current_state() != RawConnectionState::Connected {
            return Err(TransportError::Unavailable(format!(
                "transport is {}",
                self.current_state()
            )));
        }

        self.published
            .lock()
            .expect("transport lock")
            .push((*conversation_id, message));
        Ok(())
    }

    fn subscribe_states(&self) -> mpsc::UnboundedReceiver<RawConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state_subs.lock().expect("transport lock").push(tx);
        rx
    }
}
