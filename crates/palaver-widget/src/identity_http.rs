//! HTTP client for the platform's contact identity service.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use palaver_shared::{ContactId, ContactIdentity, WorkspaceId};

use crate::identity::{ContactDetails, IdentityError, IdentityService};

pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
    workspace_id: WorkspaceId,
}

#[derive(Debug, Deserialize)]
struct ContactDto {
    id: String,
}

impl HttpIdentityService {
    pub fn new(base_url: impl Into<String>, workspace_id: WorkspaceId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            workspace_id,
        }
    }

    fn contacts_url(&self) -> String {
        format!(
            "{}/api/v1/workspaces/{}/contacts",
            self.base_url.trim_end_matches('/'),
            self.workspace_id
        )
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn get_by_id(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactIdentity>, IdentityError> {
        let url = format!("{}/{}", self.contacts_url(), contact_id);
        debug!(%url, "fetching contact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(IdentityError::Rejected(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let dto: ContactDto = response
            .json()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        Ok(Some(ContactIdentity {
            contact_id: ContactId(dto.id),
            verified: true,
        }))
    }

    async fn find_or_create(
        &self,
        details: &ContactDetails,
    ) -> Result<ContactIdentity, IdentityError> {
        let url = self.contacts_url();
        debug!(%url, "finding or creating contact");

        let response = self
            .client
            .post(&url)
            .json(details)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(format!(
                "POST {url} returned {}",
                response.status()
            )));
        }

        let dto: ContactDto = response
            .json()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        Ok(ContactIdentity {
            contact_id: ContactId(dto.id),
            verified: true,
        })
    }
}
