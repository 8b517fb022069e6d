//! Time-boxed session tracking, independent of the transport connection.
//!
//! The key invariant is the two-signal design: `update_activity` is a cheap
//! presence signal that never moves the hard expiry, while `extend_session`
//! is the deliberate renewal that does. Activity noise from an idle tab can
//! therefore never keep a session alive past its window; expiry is detected
//! by a fixed-interval poll, not by events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use palaver_store::{Session, SessionStore};

use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// Remaining time is below the warning threshold; the UI should offer
    /// an explicit extension.
    Warning,
    Expired,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SessionEvent {
    Started { session_id: Uuid },
    Renewed,
    Warning { remaining_secs: u64 },
    Expired,
}

struct SessionInner {
    session: Option<Session>,
    state: SessionState,
}

pub struct SessionManager {
    config: SessionConfig,
    store: SessionStore,
    inner: Mutex<SessionInner>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionManager {
    /// Build a manager over the persisted session record. An unexpired
    /// persisted session is adopted as-is (its window keeps running across
    /// restarts); an expired one is discarded.
    pub fn new(store: SessionStore, config: SessionConfig) -> Self {
        let now = Utc::now();
        let session = match store.load() {
            Some(session) if !session.is_expired_at(now) => {
                debug!(session_id = %session.id, "restored unexpired session");
                Some(session)
            }
            Some(_) => {
                store.clear();
                None
            }
            None => None,
        };

        let state = if session.is_some() {
            SessionState::Active
        } else {
            SessionState::Expired
        };

        Self {
            config,
            store,
            inner: Mutex::new(SessionInner { session, state }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().expect("session lock").push(tx);
        rx
    }

    fn notify(&self, event: SessionEvent) {
        let mut listeners = self.listeners.lock().expect("session lock");
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Create a fresh session and return its id.
    pub fn init_session(&self) -> Uuid {
        self.init_session_at(Utc::now())
    }

    pub(crate) fn init_session_at(&self, now: DateTime<Utc>) -> Uuid {
        let session = Session::start_at(now, chrono_duration(self.config.duration));
        let id = session.id;
        {
            let mut inner = self.inner.lock().expect("session lock");
            inner.session = Some(session.clone());
            inner.state = SessionState::Active;
        }
        self.store.save(&session);
        info!(session_id = %id, "session started");
        self.notify(SessionEvent::Started { session_id: id });
        id
    }

    /// Record user presence. Bumps `last_activity_at` only; the hard expiry
    /// is untouched.
    pub fn update_activity(&self) {
        self.update_activity_at(Utc::now());
    }

    pub(crate) fn update_activity_at(&self, now: DateTime<Utc>) {
        let updated = {
            let mut inner = self.inner.lock().expect("session lock");
            match inner.session.as_mut() {
                Some(session) => {
                    session.last_activity_at = now;
                    Some(session.clone())
                }
                None => None,
            }
        };
        if let Some(session) = updated {
            self.store.save(&session);
        }
    }

    /// Deliberate renewal: restart the expiry window, clear any warning,
    /// notify listeners.
    pub fn extend_session(&self) {
        self.extend_session_at(Utc::now());
    }

    pub(crate) fn extend_session_at(&self, now: DateTime<Utc>) {
        let extended = {
            let mut inner = self.inner.lock().expect("session lock");
            match inner.session.as_mut() {
                Some(session) => {
                    session.last_activity_at = now;
                    session.expires_at = now + chrono_duration(self.config.duration);
                    let cloned = session.clone();
                    inner.state = SessionState::Active;
                    Some(cloned)
                }
                None => None,
            }
        };
        if let Some(session) = extended {
            self.store.save(&session);
            debug!(session_id = %session.id, expires_at = %session.expires_at, "session extended");
            self.notify(SessionEvent::Renewed);
        }
    }

    /// Tear the session down and notify listeners of expiry.
    pub fn end_session(&self) {
        {
            let mut inner = self.inner.lock().expect("session lock");
            inner.session = None;
            inner.state = SessionState::Expired;
        }
        self.store.clear();
        info!("session ended");
        self.notify(SessionEvent::Expired);
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session lock").state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state(), SessionState::Expired)
    }

    pub fn show_timeout_warning(&self) -> bool {
        self.state() == SessionState::Warning
    }

    /// A copy of the live session record, if any.
    pub fn current(&self) -> Option<Session> {
        self.inner.lock().expect("session lock").session.clone()
    }

    pub fn time_remaining(&self) -> Duration {
        self.time_remaining_at(Utc::now())
    }

    pub(crate) fn time_remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.inner
            .lock()
            .expect("session lock")
            .session
            .as_ref()
            .map(|s| s.remaining_at(now))
            .unwrap_or_default()
    }

    /// One expiry check. Auto-renews when the user was recently active and
    /// the window is closing; otherwise raises the warning, and past the
    /// hard expiry tears the session down.
    pub fn tick(&self) {
        self.tick_at(Utc::now());
    }

    pub(crate) fn tick_at(&self, now: DateTime<Utc>) {
        enum Outcome {
            None,
            Renew,
            Warn(u64),
            Expire,
        }

        let outcome = {
            let mut inner = self.inner.lock().expect("session lock");
            let Some(session) = inner.session.as_ref() else {
                return;
            };

            if session.is_expired_at(now) {
                inner.session = None;
                inner.state = SessionState::Expired;
                Outcome::Expire
            } else {
                let remaining = session.remaining_at(now);
                let recently_active = session.idle_at(now) <= self.config.activity_window;

                if remaining <= self.config.renewal_threshold && recently_active {
                    Outcome::Renew
                } else if remaining <= self.config.warning_threshold
                    && inner.state != SessionState::Warning
                {
                    inner.state = SessionState::Warning;
                    Outcome::Warn(remaining.as_secs())
                } else {
                    Outcome::None
                }
            }
        };

        match outcome {
            Outcome::None => {}
            Outcome::Renew => self.extend_session_at(now),
            Outcome::Warn(remaining_secs) => {
                debug!(remaining_secs, "session nearing expiry");
                self.notify(SessionEvent::Warning { remaining_secs });
            }
            Outcome::Expire => {
                self.store.clear();
                info!("session expired");
                self.notify(SessionEvent::Expired);
            }
        }
    }

    /// Spawn the fixed-interval expiry poll.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let poll = manager.config.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.tick();
            }
        })
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_shared::WorkspaceId;
    use palaver_store::MemoryStore;

    fn config() -> SessionConfig {
        SessionConfig {
            duration: Duration::from_secs(1800),
            warning_threshold: Duration::from_secs(120),
            renewal_threshold: Duration::from_secs(300),
            activity_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
        }
    }

    fn manager() -> SessionManager {
        let store = SessionStore::new(
            Arc::new(MemoryStore::new()),
            &WorkspaceId("ws-test".into()),
        );
        SessionManager::new(store, config())
    }

    #[test]
    fn init_session_sets_full_window() {
        let mgr = manager();
        let now = Utc::now();
        mgr.init_session_at(now);

        assert!(mgr.is_active());
        assert_eq!(mgr.time_remaining_at(now), Duration::from_secs(1800));
    }

    #[test]
    fn activity_never_extends_expiry() {
        let mgr = manager();
        let now = Utc::now();
        mgr.init_session_at(now);
        let expires_before = mgr.current().unwrap().expires_at;

        mgr.update_activity_at(now + chrono::Duration::minutes(5));

        let session = mgr.current().unwrap();
        assert_eq!(session.expires_at, expires_before);
        assert!(session.last_activity_at > session.created_at);
    }

    #[test]
    fn extend_restarts_the_window() {
        let mgr = manager();
        let now = Utc::now();
        mgr.init_session_at(now);
        let mut events = mgr.subscribe();

        let later = now + chrono::Duration::minutes(20);
        mgr.extend_session_at(later);

        assert_eq!(
            mgr.time_remaining_at(later),
            Duration::from_secs(1800),
            "extension restarts the full window"
        );
        assert_eq!(events.try_recv(), Ok(SessionEvent::Renewed));
    }

    #[test]
    fn idle_user_gets_warning_then_expiry() {
        let mgr = manager();
        let now = Utc::now();
        mgr.init_session_at(now);
        let mut events = mgr.subscribe();

        // 29 minutes in, idle since creation: warning, no auto-renew.
        mgr.tick_at(now + chrono::Duration::minutes(29));
        assert!(mgr.show_timeout_warning());
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::Warning { remaining_secs: 60 })
        ));

        // The warning is raised once, not on every poll.
        mgr.tick_at(now + chrono::Duration::seconds(29 * 60 + 10));
        assert!(events.try_recv().is_err());

        mgr.tick_at(now + chrono::Duration::minutes(31));
        assert!(!mgr.is_active());
        assert_eq!(events.try_recv(), Ok(SessionEvent::Expired));
    }

    #[test]
    fn recently_active_user_is_auto_renewed() {
        let mgr = manager();
        let now = Utc::now();
        mgr.init_session_at(now);
        let mut events = mgr.subscribe();

        let close_to_expiry = now + chrono::Duration::minutes(26);
        mgr.update_activity_at(close_to_expiry);
        mgr.tick_at(close_to_expiry);

        assert!(mgr.is_active());
        assert!(!mgr.show_timeout_warning());
        assert_eq!(events.try_recv(), Ok(SessionEvent::Renewed));
        assert_eq!(
            mgr.time_remaining_at(close_to_expiry),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn end_session_notifies_and_clears() {
        let mgr = manager();
        mgr.init_session();
        let mut events = mgr.subscribe();

        mgr.end_session();
        assert!(!mgr.is_active());
        assert_eq!(mgr.time_remaining(), Duration::ZERO);
        assert_eq!(events.try_recv(), Ok(SessionEvent::Expired));
    }

    #[test]
    fn unexpired_session_is_restored() {
        let kv: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let workspace = WorkspaceId("ws-test".into());

        let first = SessionManager::new(SessionStore::new(kv.clone(), &workspace), config());
        let id = first.init_session();
        drop(first);

        let second = SessionManager::new(SessionStore::new(kv, &workspace), config());
        assert!(second.is_active());
        assert_eq!(second.current().unwrap().id, id);
    }
}
