//! The widget facade.
//!
//! Owns every component of the resilience layer and wires them together:
//! the connection monitor's `connected` transition is subscribed to the
//! sync coordinator here (and only here), component events are fanned out
//! to the embedding UI as [`WidgetEvent`]s, and the send path runs the
//! full gate sequence: rate limit, session, identity, transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use palaver_shared::constants::{BACKGROUND_SYNC_TAG, MAX_MESSAGE_SIZE};
use palaver_shared::{ConnectionState, ContactIdentity, ConversationId, WorkspaceId};
use palaver_store::{
    FallbackStore, IdentityCache, KeyValueStore, MemoryStore, OfflineMessageQueue, QueuedMessage,
    SessionStore, SqliteStore,
};
use palaver_transport::{ConnectionMonitor, RawConnectionState, Transport};

use crate::config::WidgetConfig;
use crate::events::WidgetEvent;
use crate::host::HostEnvironment;
use crate::identity::{ContactDetails, ContactIdentityResolver, IdentityService};
use crate::rate_limit::RateLimiter;
use crate::session::{SessionEvent, SessionManager};
use crate::sync::{outbound_from, SyncCoordinator, SyncEvent};

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<WidgetEvent>>>>;

pub struct Widget {
    config: WidgetConfig,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostEnvironment>,
    queue: Arc<OfflineMessageQueue>,
    monitor: Arc<ConnectionMonitor>,
    coordinator: Arc<SyncCoordinator>,
    sessions: Arc<SessionManager>,
    resolver: ContactIdentityResolver,
    limiter: Mutex<RateLimiter>,
    subscribers: Subscribers,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Widget {
    pub fn new(
        config: WidgetConfig,
        workspace_id: &WorkspaceId,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        identity_service: Arc<dyn IdentityService>,
        host: Arc<dyn HostEnvironment>,
    ) -> Arc<Self> {
        let queue = Arc::new(OfflineMessageQueue::new(store.clone()));
        let identity_cache = Arc::new(IdentityCache::new(store.clone()));
        let monitor = Arc::new(ConnectionMonitor::new(transport.clone()));
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            transport.clone(),
            host.clone(),
            identity_cache.clone(),
            config.publish_timeout,
        ));
        let sessions = Arc::new(SessionManager::new(
            SessionStore::new(store, workspace_id),
            config.session.clone(),
        ));
        let resolver = ContactIdentityResolver::new(identity_service, identity_cache);
        let limiter = Mutex::new(RateLimiter::new(config.rate_limit.clone()));

        Arc::new(Self {
            config,
            transport,
            host,
            queue,
            monitor,
            coordinator,
            sessions,
            resolver,
            limiter,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Bring the widget up: spawn the listener tasks, ensure a session,
    /// resolve the cached identity, and issue the initial connect.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut tasks = self.tasks.lock().expect("widget lock");
            tasks.push(self.monitor.start());
            tasks.push(self.sessions.start());
            tasks.extend(self.spawn_forwarders());
        }

        if !self.sessions.is_active() {
            self.sessions.init_session();
        }

        if self.resolver.resolve().await.is_none() && self.resolver.cached_id().is_none() {
            self.emit(WidgetEvent::NeedsContactInfo);
        }

        if self.transport.current_state() == RawConnectionState::Initialized {
            info!("connecting transport");
            if let Err(e) = self.transport.connect().await {
                warn!(error = %e, "initial connect failed");
            }
        }
    }

    /// Send a message, or queue it when it cannot go out right now.
    ///
    /// Returns true when the message was published or durably queued;
    /// false when the send was refused (rate limited, no session, no
    /// identity, oversized, or permanently rejected).
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        attachment_refs: Vec<String>,
    ) -> bool {
        let limited = {
            let mut limiter = self.limiter.lock().expect("widget lock");
            if limiter.check_action() {
                None
            } else {
                Some(limiter.time_remaining())
            }
        };
        if let Some(retry_in) = limited {
            warn!(%conversation_id, retry_in_ms = retry_in.as_millis() as u64, "send refused: rate limited");
            self.emit(WidgetEvent::RateLimited {
                retry_in_ms: retry_in.as_millis() as u64,
            });
            return false;
        }

        if !self.sessions.is_active() {
            debug!(%conversation_id, "send refused: no active session");
            return false;
        }
        self.sessions.update_activity();

        let Some(contact_id) = self.resolver.cached_id() else {
            debug!(%conversation_id, "send refused: no contact identity");
            self.emit(WidgetEvent::NeedsContactInfo);
            return false;
        };

        if content.len() > MAX_MESSAGE_SIZE {
            warn!(%conversation_id, size = content.len(), "send refused: message too large");
            return false;
        }

        let message = QueuedMessage::new(conversation_id, content, attachment_refs);

        if self.monitor.is_connected() {
            let outbound = outbound_from(&message, Some(contact_id));
            match timeout(
                self.config.publish_timeout,
                self.transport.publish(&conversation_id, outbound),
            )
            .await
            {
                Ok(Ok(())) => {
                    debug!(%conversation_id, message_id = %message.id, "message published");
                    return true;
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    error!(%conversation_id, message_id = %message.id, error = %e, "message permanently rejected");
                    return false;
                }
                Ok(Err(e)) => {
                    warn!(%conversation_id, message_id = %message.id, error = %e, "publish failed, queueing");
                }
                Err(_) => {
                    warn!(%conversation_id, message_id = %message.id, "publish timed out, queueing");
                }
            }
        }

        debug!(%conversation_id, message_id = %message.id, "message queued for later delivery");
        self.queue.enqueue(message);
        self.host.register_background_sync(BACKGROUND_SYNC_TAG);
        true
    }

    /// Establish a contact identity from user-supplied details.
    pub async fn identify(&self, details: &ContactDetails) -> Option<ContactIdentity> {
        match self.resolver.create_or_find(details).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "identity creation failed");
                None
            }
        }
    }

    /// User-initiated retry: reconnect if the connection is down, then
    /// drain whatever is queued.
    pub async fn trigger_manual_sync(&self) {
        self.monitor.reconnect().await;
        self.coordinator.sync_all().await;
    }

    /// Background-sync wake-up from the hosting environment. Arrives
    /// outside the normal call flow; safe to invoke at any time.
    pub async fn handle_background_sync(&self) {
        debug!("background sync wake-up");
        self.coordinator.sync_all().await;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    pub fn has_queued_messages(&self) -> bool {
        self.queue.has_queued()
    }

    pub fn queued_message_count(&self) -> usize {
        self.queue.count()
    }

    pub fn is_session_active(&self) -> bool {
        self.sessions.is_active()
    }

    pub fn session_time_remaining(&self) -> Duration {
        self.sessions.time_remaining()
    }

    pub fn show_timeout_warning(&self) -> bool {
        self.sessions.show_timeout_warning()
    }

    pub fn extend_session(&self) {
        self.sessions.extend_session();
    }

    pub fn end_session(&self) {
        self.sessions.end_session();
    }

    pub fn needs_contact_info(&self) -> bool {
        self.resolver.cached_id().is_none()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WidgetEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("widget lock").push(tx);
        rx
    }

    fn emit(&self, event: WidgetEvent) {
        emit_to(&self.subscribers, event);
    }

    /// Forward component events to UI subscribers. The connection forwarder
    /// is also where the monitor's `connected` transition triggers a drain,
    /// keeping monitor and coordinator free of each other.
    fn spawn_forwarders(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        {
            let subscribers = Arc::clone(&self.subscribers);
            let coordinator = Arc::clone(&self.coordinator);
            let mut states = self.monitor.subscribe();
            tasks.push(tokio::spawn(async move {
                while let Some(state) = states.recv().await {
                    emit_to(&subscribers, WidgetEvent::ConnectionChanged { state });
                    if state == ConnectionState::Connected {
                        coordinator.sync_all().await;
                    }
                }
            }));
        }

        {
            let subscribers = Arc::clone(&self.subscribers);
            let mut events = self.sessions.subscribe();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let mapped = match event {
                        SessionEvent::Started { session_id } => {
                            WidgetEvent::SessionStarted { session_id }
                        }
                        SessionEvent::Renewed => WidgetEvent::SessionRenewed,
                        SessionEvent::Warning { remaining_secs } => {
                            WidgetEvent::SessionWarning { remaining_secs }
                        }
                        SessionEvent::Expired => WidgetEvent::SessionExpired,
                    };
                    emit_to(&subscribers, mapped);
                }
            }));
        }

        {
            let subscribers = Arc::clone(&self.subscribers);
            let mut events = self.coordinator.subscribe();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let mapped = match event {
                        SyncEvent::Started { conversation_id } => {
                            WidgetEvent::SyncStarted { conversation_id }
                        }
                        SyncEvent::Completed { conversation_id } => {
                            WidgetEvent::SyncCompleted { conversation_id }
                        }
                        SyncEvent::Failed {
                            conversation_id,
                            error,
                        } => WidgetEvent::SyncFailed {
                            conversation_id,
                            error,
                        },
                        SyncEvent::MessageDropped {
                            conversation_id,
                            message_id,
                            error,
                        } => WidgetEvent::MessageDropped {
                            conversation_id,
                            message_id,
                            error,
                        },
                    };
                    emit_to(&subscribers, mapped);
                }
            }));
        }

        tasks
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

fn emit_to(subscribers: &Subscribers, event: WidgetEvent) {
    let mut subs = subscribers.lock().expect("widget lock");
    subs.retain(|tx| tx.send(event.clone()).is_ok());
}

/// Durable store for desktop-class hosts: SQLite wrapped in the
/// degrade-to-memory fallback. Falls back to a plain in-memory store when
/// no database can be opened at all.
pub fn default_store() -> Arc<dyn KeyValueStore> {
    match SqliteStore::new() {
        Ok(store) => Arc::new(FallbackStore::new(Box::new(store))),
        Err(e) => {
            warn!(error = %e, "no durable store available, running in-memory");
            Arc::new(MemoryStore::new())
        }
    }
}
