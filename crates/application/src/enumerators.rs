//! Enumerators backed by the relational store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use synccoord_core::AppResult;
use synccoord_domain::{SyncResource, SyncWorkItem};

use crate::sync_ports::{SourceDocumentLister, SyncRepository, WorkItemEnumerator};

/// Emits one removal item per stored document of a resource being deleted.
pub struct DeletionEnumerator {
    repository: Arc<dyn SyncRepository>,
}

impl DeletionEnumerator {
    /// Creates the enumerator.
    #[must_use]
    pub fn new(repository: Arc<dyn SyncRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl WorkItemEnumerator for DeletionEnumerator {
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        Ok(self
            .repository
            .list_document_ids(resource.id)
            .await?
            .into_iter()
            .map(SyncWorkItem::remove_document)
            .collect())
    }
}

/// Emits removal items for stored documents the source no longer holds.
pub struct PruningEnumerator {
    repository: Arc<dyn SyncRepository>,
    source: Arc<dyn SourceDocumentLister>,
}

impl PruningEnumerator {
    /// Creates the enumerator.
    #[must_use]
    pub fn new(repository: Arc<dyn SyncRepository>, source: Arc<dyn SourceDocumentLister>) -> Self {
        Self { repository, source }
    }
}

#[async_trait]
impl WorkItemEnumerator for PruningEnumerator {
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        let at_source: HashSet<String> = self
            .source
            .list_source_document_ids(resource)
            .await?
            .into_iter()
            .collect();

        Ok(self
            .repository
            .list_document_ids(resource.id)
            .await?
            .into_iter()
            .filter(|document_id| !at_source.contains(document_id))
            .map(SyncWorkItem::remove_document)
            .collect())
    }
}
