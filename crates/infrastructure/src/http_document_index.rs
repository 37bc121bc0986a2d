//! Document index reached through its HTTP API.

use async_trait::async_trait;
use serde::Serialize;
use synccoord_application::{DocumentIndex, IndexDocumentUpdate};
use synccoord_core::AppResult;
use synccoord_domain::DocumentAccess;
use tracing::debug;

use crate::http_retry::{HttpRetryPolicy, endpoint};

/// HTTP implementation of the document index port.
pub struct HttpDocumentIndex {
    http_client: reqwest::Client,
    base_url: String,
    retry: HttpRetryPolicy,
}

#[derive(Debug, Serialize)]
struct UpsertDocumentsRequest<'a> {
    documents: Vec<IndexDocumentBody<'a>>,
}

#[derive(Debug, Serialize)]
struct IndexDocumentBody<'a> {
    document_id: &'a str,
    resource_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access: Option<&'a DocumentAccess>,
}

#[derive(Debug, Serialize)]
struct DeleteDocumentsRequest<'a> {
    document_ids: &'a [String],
}

impl<'a> From<&'a IndexDocumentUpdate> for IndexDocumentBody<'a> {
    fn from(update: &'a IndexDocumentUpdate) -> Self {
        Self {
            document_id: update.document_id.as_str(),
            resource_id: update.resource_id.as_i64(),
            title: update.title.as_deref(),
            content: update.content.as_deref(),
            access: update.access.as_ref(),
        }
    }
}

impl HttpDocumentIndex {
    /// Creates an index client for the given base URL.
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
}

#[async_trait]
impl DocumentIndex for HttpDocumentIndex {
    async fn upsert(&self, documents: &[IndexDocumentUpdate]) -> AppResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let url = endpoint(self.base_url.as_str(), "documents");
        let body = UpsertDocumentsRequest {
            documents: documents.iter().map(IndexDocumentBody::from).collect(),
        };

        self.retry
            .send(&self.http_client, "document index upsert", |client| {
                client.post(url.as_str()).json(&body)
            })
            .await?;

        debug!(count = documents.len(), "upserted documents into index");
        Ok(())
    }

    async fn delete(&self, document_ids: &[String]) -> AppResult<()> {
        if document_ids.is_empty() {
            return Ok(());
        }

        let url = endpoint(self.base_url.as_str(), "documents/delete");
        let body = DeleteDocumentsRequest { document_ids };

        self.retry
            .send(&self.http_client, "document index delete", |client| {
                client.post(url.as_str()).json(&body)
            })
            .await?;

        debug!(count = document_ids.len(), "deleted documents from index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use synccoord_application::IndexDocumentUpdate;
    use synccoord_domain::{DocumentAccess, ResourceId};

    use super::IndexDocumentBody;

    #[test]
    fn access_only_updates_omit_content_fields() {
        let update = IndexDocumentUpdate {
            document_id: "doc-7".to_owned(),
            resource_id: ResourceId::new(42),
            title: None,
            content: None,
            access: Some(DocumentAccess {
                external_user_emails: vec!["ana@example.com".to_owned()],
                external_user_group_ids: Vec::new(),
                is_public: false,
            }),
        };

        let encoded =
            serde_json::to_value(IndexDocumentBody::from(&update)).unwrap_or_default();

        assert_eq!(encoded["resource_id"], 42);
        assert!(encoded.get("title").is_none());
        assert!(encoded.get("content").is_none());
        assert_eq!(encoded["access"]["is_public"], false);
    }
}
