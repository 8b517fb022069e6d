//! Cached contact id, global to the browser/host profile.
//!
//! The value is the raw id string, not JSON, matching the layout other
//! widget builds on the same host expect.

use std::sync::Arc;

use tracing::warn;

use palaver_shared::constants::IDENTITY_KEY;
use palaver_shared::ContactId;

use crate::kv::KeyValueStore;

pub struct IdentityCache {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Option<ContactId> {
        match self.store.get(IDENTITY_KEY) {
            Ok(Some(id)) if !id.is_empty() => Some(ContactId(id)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read cached contact id");
                None
            }
        }
    }

    pub fn save(&self, contact_id: &ContactId) {
        if let Err(e) = self.store.set(IDENTITY_KEY, &contact_id.0) {
            warn!(error = %e, "failed to persist contact id");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(IDENTITY_KEY) {
            warn!(error = %e, "failed to clear cached contact id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[test]
    fn round_trip() {
        let cache = IdentityCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.load().is_none());

        cache.save(&ContactId("contact-42".into()));
        assert_eq!(cache.load(), Some(ContactId("contact-42".into())));

        cache.clear();
        assert!(cache.load().is_none());
    }
}
