//! Connector gateway client used for enumeration and source listings.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use synccoord_application::{SourceDocumentLister, WorkItemEnumerator};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{SyncDomain, SyncResource, SyncWorkItem};
use tracing::debug;

use crate::http_retry::{HttpRetryPolicy, endpoint};

/// HTTP client for the connector gateway.
///
/// The gateway runs connector implementations and answers with complete,
/// unpaginated result sets.
pub struct HttpConnectorGateway {
    http_client: reqwest::Client,
    base_url: String,
    retry: HttpRetryPolicy,
}

#[derive(Debug, Deserialize)]
struct WorkItemsResponse {
    items: Vec<SyncWorkItem>,
}

#[derive(Debug, Deserialize)]
struct DocumentIdsResponse {
    document_ids: Vec<String>,
}

impl HttpConnectorGateway {
    /// Creates a gateway client for the given base URL.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        retry: HttpRetryPolicy,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            retry,
        }
    }

    fn resource_path(resource: &SyncResource, suffix: &str) -> String {
        format!(
            "connectors/{}/resources/{}/{suffix}",
            resource.connector_type, resource.id
        )
    }

    /// Fetches every work item of one resource for one domain.
    pub async fn fetch_work_items(
        &self,
        domain: SyncDomain,
        resource: &SyncResource,
    ) -> AppResult<Vec<SyncWorkItem>> {
        let url = format!(
            "{}?domain={}",
            endpoint(
                self.base_url.as_str(),
                Self::resource_path(resource, "work-items").as_str(),
            ),
            domain.as_str()
        );
        let operation = format!("{domain} enumeration for resource '{}'", resource.id);

        let response = self
            .retry
            .send(&self.http_client, operation.as_str(), |client| {
                client.get(url.as_str())
            })
            .await?;

        let body = response
            .json::<WorkItemsResponse>()
            .await
            .map_err(|error| AppError::Internal(format!("invalid {operation} response: {error}")))?;

        debug!(
            domain = %domain,
            resource_id = %resource.id,
            count = body.items.len(),
            "fetched work items from connector gateway"
        );
        Ok(body.items)
    }
}

#[async_trait]
impl SourceDocumentLister for HttpConnectorGateway {
    async fn list_source_document_ids(&self, resource: &SyncResource) -> AppResult<Vec<String>> {
        let url = endpoint(
            self.base_url.as_str(),
            Self::resource_path(resource, "document-ids").as_str(),
        );
        let operation = format!("source listing for resource '{}'", resource.id);

        let response = self
            .retry
            .send(&self.http_client, operation.as_str(), |client| {
                client.get(url.as_str())
            })
            .await?;

        response
            .json::<DocumentIdsResponse>()
            .await
            .map(|body| body.document_ids)
            .map_err(|error| AppError::Internal(format!("invalid {operation} response: {error}")))
    }
}

/// Enumerator that asks the connector gateway for one domain's work items.
#[derive(Clone)]
pub struct HttpConnectorEnumerator {
    gateway: Arc<HttpConnectorGateway>,
    domain: SyncDomain,
}

impl HttpConnectorEnumerator {
    /// Creates an enumerator for one domain.
    #[must_use]
    pub fn new(gateway: Arc<HttpConnectorGateway>, domain: SyncDomain) -> Self {
        Self { gateway, domain }
    }
}

#[async_trait]
impl WorkItemEnumerator for HttpConnectorEnumerator {
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        self.gateway.fetch_work_items(self.domain, resource).await
    }
}
