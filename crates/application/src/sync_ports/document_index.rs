use async_trait::async_trait;
use synccoord_core::AppResult;
use synccoord_domain::{DocumentAccess, ResourceId};

/// Partial document write sent to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocumentUpdate {
    /// Document identifier.
    pub document_id: String,
    /// Owning resource.
    pub resource_id: ResourceId,
    /// New title, when content changed.
    pub title: Option<String>,
    /// New content, when content changed.
    pub content: Option<String>,
    /// New access control, when permissions changed.
    pub access: Option<DocumentAccess>,
}

/// Document index port.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Upserts documents.
    async fn upsert(&self, documents: &[IndexDocumentUpdate]) -> AppResult<()>;

    /// Deletes documents by id.
    async fn delete(&self, document_ids: &[String]) -> AppResult<()>;
}
