//! Typed access to the persisted per-workspace session record.

use std::sync::Arc;

use tracing::warn;

use palaver_shared::constants::SESSION_KEY_PREFIX;
use palaver_shared::WorkspaceId;

use crate::kv::KeyValueStore;
use crate::models::Session;

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, workspace_id: &WorkspaceId) -> Self {
        Self {
            store,
            key: format!("{SESSION_KEY_PREFIX}{workspace_id}"),
        }
    }

    /// The persisted session, if one exists and parses. A corrupt record is
    /// dropped so the next `save` starts clean.
    pub fn load(&self) -> Option<Session> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read session record");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "corrupt session record, discarding");
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, session: &Session) {
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize session record");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &raw) {
            warn!(error = %e, "failed to write session record");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            warn!(error = %e, "failed to clear session record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use chrono::{Duration, Utc};

    fn store() -> SessionStore {
        SessionStore::new(
            Arc::new(MemoryStore::new()),
            &WorkspaceId("ws-test".into()),
        )
    }

    #[test]
    fn save_load_clear_round_trip() {
        let sessions = store();
        assert!(sessions.load().is_none());

        let session = Session::start_at(Utc::now(), Duration::minutes(30));
        sessions.save(&session);
        assert_eq!(sessions.load(), Some(session));

        sessions.clear();
        assert!(sessions.load().is_none());
    }

    #[test]
    fn corrupt_record_is_discarded() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("session::ws-test", "{ nope").unwrap();

        let sessions = SessionStore::new(kv.clone(), &WorkspaceId("ws-test".into()));
        assert!(sessions.load().is_none());
        // The bad record was removed, not left to fail again.
        assert!(kv.get("session::ws-test").unwrap().is_none());
    }
}
