//! Durable contact identity resolution.
//!
//! The contact id scopes queue and session storage and authenticates
//! outbound sends. Resolution is deliberately conservative about the local
//! cache: only a definitive not-found from the identity service clears it.
//! A network failure keeps the cached id, since retrying later is safer
//! than forcing the user to re-enter their details.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use palaver_shared::{ContactId, ContactIdentity};
use palaver_store::IdentityCache;

/// User-supplied details for creating (or finding) a contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    /// The identity service could not be reached; the cached id survives.
    #[error("Identity service unreachable: {0}")]
    Network(String),

    /// The identity service understood the request and refused it.
    #[error("Identity service rejected the request: {0}")]
    Rejected(String),
}

/// The identity service collaborator.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Fetch a contact by id. `Ok(None)` means the backing identity no
    /// longer exists.
    async fn get_by_id(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactIdentity>, IdentityError>;

    /// Find or create a contact from user-supplied details.
    async fn find_or_create(
        &self,
        details: &ContactDetails,
    ) -> Result<ContactIdentity, IdentityError>;
}

pub struct ContactIdentityResolver {
    service: Arc<dyn IdentityService>,
    cache: Arc<IdentityCache>,
}

impl ContactIdentityResolver {
    pub fn new(service: Arc<dyn IdentityService>, cache: Arc<IdentityCache>) -> Self {
        Self { service, cache }
    }

    /// The locally-cached contact id, if any.
    pub fn cached_id(&self) -> Option<ContactId> {
        self.cache.load()
    }

    /// Resolve the cached id against the identity service.
    ///
    /// Returns `None` when there is no cached id, when the backing identity
    /// no longer exists (the stale cache entry is cleared), or when the
    /// service is unreachable (the cache entry is kept for a later retry).
    pub async fn resolve(&self) -> Option<ContactIdentity> {
        let cached = self.cache.load()?;

        match self.service.get_by_id(&cached).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                info!(contact_id = %cached, "cached contact no longer exists, clearing");
                self.cache.clear();
                None
            }
            Err(e) => {
                warn!(contact_id = %cached, error = %e, "identity resolution failed, keeping cached id");
                None
            }
        }
    }

    /// Find or create an identity from user details, persist the id, and
    /// mark it verified.
    pub async fn create_or_find(
        &self,
        details: &ContactDetails,
    ) -> Result<ContactIdentity, IdentityError> {
        let identity = self.service.find_or_create(details).await?;
        self.cache.save(&identity.contact_id);
        info!(contact_id = %identity.contact_id, "contact identity established");
        Ok(ContactIdentity {
            verified: true,
            ..identity
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use palaver_store::MemoryStore;

    /// Scripted identity service: each call pops the next response.
    #[derive(Default)]
    struct ScriptedService {
        get_responses: Mutex<Vec<Result<Option<ContactIdentity>, IdentityError>>>,
        created: Mutex<Vec<ContactDetails>>,
    }

    impl ScriptedService {
        fn respond_with(self, response: Result<Option<ContactIdentity>, IdentityError>) -> Self {
            self.get_responses.lock().unwrap().push(response);
            self
        }
    }

    #[async_trait]
    impl IdentityService for ScriptedService {
        async fn get_by_id(
            &self,
            _contact_id: &ContactId,
        ) -> Result<Option<ContactIdentity>, IdentityError> {
            self.get_responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(None))
        }

        async fn find_or_create(
            &self,
            details: &ContactDetails,
        ) -> Result<ContactIdentity, IdentityError> {
            self.created.lock().unwrap().push(details.clone());
            Ok(ContactIdentity {
                contact_id: ContactId("contact-new".into()),
                verified: true,
            })
        }
    }

    fn cache() -> Arc<IdentityCache> {
        Arc::new(IdentityCache::new(Arc::new(MemoryStore::new())))
    }

    fn identity(id: &str) -> ContactIdentity {
        ContactIdentity {
            contact_id: ContactId(id.into()),
            verified: true,
        }
    }

    #[tokio::test]
    async fn resolve_without_cache_is_none() {
        let resolver = ContactIdentityResolver::new(Arc::new(ScriptedService::default()), cache());
        assert!(resolver.resolve().await.is_none());
    }

    #[tokio::test]
    async fn resolve_returns_backing_identity() {
        let cache = cache();
        cache.save(&ContactId("contact-7".into()));
        let service = ScriptedService::default().respond_with(Ok(Some(identity("contact-7"))));

        let resolver = ContactIdentityResolver::new(Arc::new(service), cache);
        assert_eq!(resolver.resolve().await, Some(identity("contact-7")));
    }

    #[tokio::test]
    async fn not_found_clears_the_cache() {
        let cache = cache();
        cache.save(&ContactId("contact-gone".into()));
        let service = ScriptedService::default().respond_with(Ok(None));

        let resolver = ContactIdentityResolver::new(Arc::new(service), cache);
        assert!(resolver.resolve().await.is_none());
        assert!(resolver.cached_id().is_none());
    }

    #[tokio::test]
    async fn network_failure_keeps_the_cache() {
        let cache = cache();
        cache.save(&ContactId("contact-7".into()));
        let service = ScriptedService::default()
            .respond_with(Err(IdentityError::Network("dns failure".into())));

        let resolver = ContactIdentityResolver::new(Arc::new(service), cache);
        assert!(resolver.resolve().await.is_none());
        assert_eq!(resolver.cached_id(), Some(ContactId("contact-7".into())));
    }

    #[tokio::test]
    async fn create_or_find_persists_and_verifies() {
        let resolver = ContactIdentityResolver::new(Arc::new(ScriptedService::default()), cache());

        let details = ContactDetails {
            email: Some("user@example.org".into()),
            ..Default::default()
        };
        let identity = resolver.create_or_find(&details).await.unwrap();

        assert!(identity.verified);
        assert_eq!(resolver.cached_id(), Some(identity.contact_id));
    }
}
