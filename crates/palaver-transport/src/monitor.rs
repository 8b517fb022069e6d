//! Normalized connection state machine.
//!
//! The monitor folds the transport's raw states into the four-value
//! [`ConnectionState`] the rest of the widget reasons about, and owns the
//! reconnect policy. Subscribers get exactly one notification per
//! normalized-state transition over a per-instance channel; there is no
//! shared registry between monitor instances, so multiple widgets on one
//! page cannot observe each other's transitions.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use palaver_shared::ConnectionState;

use crate::transport::{RawConnectionState, Transport};

/// Map a raw transport state onto the normalized state machine.
///
/// A transient raw `disconnected` reads as `connecting` because the
/// transport is still retrying on its own; only `suspended`/`closing`/
/// `closed` mean the connection is down until someone acts.
pub fn normalize(raw: RawConnectionState) -> ConnectionState {
    match raw {
        RawConnectionState::Connected => ConnectionState::Connected,
        RawConnectionState::Initialized
        | RawConnectionState::Connecting
        | RawConnectionState::Disconnected => ConnectionState::Connecting,
        RawConnectionState::Suspended
        | RawConnectionState::Closing
        | RawConnectionState::Closed => ConnectionState::Disconnected,
        RawConnectionState::Failed => ConnectionState::Failed,
    }
}

struct MonitorInner {
    state: ConnectionState,
    last_connected_at: Option<DateTime<Utc>>,
}

pub struct ConnectionMonitor {
    transport: Arc<dyn Transport>,
    inner: Mutex<MonitorInner>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectionState>>>,
}

impl ConnectionMonitor {
    /// Build a monitor over `transport`. The initial state is derived
    /// synchronously from the transport's current state, not assumed to be
    /// `connecting`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let initial = normalize(transport.current_state());
        Self {
            transport,
            inner: Mutex::new(MonitorInner {
                state: initial,
                last_connected_at: None,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().expect("monitor lock").state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// When the monitor last entered `connected`, if it ever has.
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().expect("monitor lock").last_connected_at
    }

    /// Subscribe to normalized state transitions. Each transition delivers
    /// exactly one value; the channel is unbounded so bursts are never
    /// coalesced.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("monitor lock").push(tx);
        rx
    }

    /// Feed one raw transport event through the state machine.
    ///
    /// Returns the new normalized state if this event caused a transition,
    /// `None` if the normalized state was unchanged. Public so the machine
    /// is testable without a live transport feeding it.
    pub fn apply_raw(&self, raw: RawConnectionState) -> Option<ConnectionState> {
        let next = normalize(raw);
        {
            let mut inner = self.inner.lock().expect("monitor lock");
            if inner.state == next {
                return None;
            }
            debug!(from = %inner.state, to = %next, %raw, "connection state transition");
            inner.state = next;
            if next == ConnectionState::Connected {
                inner.last_connected_at = Some(Utc::now());
            }
        }
        self.notify(next);
        Some(next)
    }

    fn notify(&self, state: ConnectionState) {
        let mut subscribers = self.subscribers.lock().expect("monitor lock");
        subscribers.retain(|tx| tx.send(state).is_ok());
    }

    /// Re-initiate the connection if it is down.
    ///
    /// No-op returning false unless the current state is `failed` or
    /// `disconnected`. A failed handle is closed before reconnecting, since
    /// transports refuse a connect call on an already-failed handle.
    /// Returns whether a reconnect attempt was actually issued.
    pub async fn reconnect(&self) -> bool {
        let state = self.state();
        match state {
            ConnectionState::Connected | ConnectionState::Connecting => false,
            ConnectionState::Failed | ConnectionState::Disconnected => {
                if state == ConnectionState::Failed {
                    self.transport.close().await;
                }
                info!(from = %state, "reconnecting transport");
                if let Err(e) = self.transport.connect().await {
                    warn!(error = %e, "reconnect attempt failed to start");
                }
                true
            }
        }
    }

    /// Spawn the listener task that feeds raw transport events into the
    /// state machine. The task ends when the transport drops its state
    /// stream.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut states = monitor.transport.subscribe_states();
        tokio::spawn(async move {
            while let Some(raw) = states.recv().await {
                monitor.apply_raw(raw);
            }
            debug!("transport state stream closed");
        })
    }
}
