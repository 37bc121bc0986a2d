use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{ConnectorType, SyncDomain, SyncResource, SyncWorkItem};

/// Enumerates every work item of one resource for one domain.
///
/// The call returns the complete set; there is no pagination.
#[async_trait]
pub trait WorkItemEnumerator: Send + Sync {
    /// Returns the resource's work items.
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>>;
}

/// Lists the document ids currently present at a resource's source.
#[async_trait]
pub trait SourceDocumentLister: Send + Sync {
    /// Returns every document id the source still holds.
    async fn list_source_document_ids(&self, resource: &SyncResource) -> AppResult<Vec<String>>;
}

/// Static mapping from domain and connector type to an enumerator.
#[derive(Clone, Default)]
pub struct EnumeratorRegistry {
    enumerators: HashMap<(SyncDomain, ConnectorType), Arc<dyn WorkItemEnumerator>>,
}

impl EnumeratorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one enumerator for a domain and connector type.
    #[must_use]
    pub fn with(
        mut self,
        domain: SyncDomain,
        connector_type: ConnectorType,
        enumerator: Arc<dyn WorkItemEnumerator>,
    ) -> Self {
        self.enumerators
            .insert((domain, connector_type), enumerator);
        self
    }

    /// Registers one enumerator for a domain across several connector types.
    #[must_use]
    pub fn with_all(
        self,
        domain: SyncDomain,
        connector_types: impl IntoIterator<Item = ConnectorType>,
        enumerator: Arc<dyn WorkItemEnumerator>,
    ) -> Self {
        connector_types
            .into_iter()
            .fold(self, |registry, connector_type| {
                registry.with(domain, connector_type, enumerator.clone())
            })
    }

    /// Returns whether an enumerator is registered.
    #[must_use]
    pub fn supports(&self, domain: SyncDomain, connector_type: ConnectorType) -> bool {
        self.enumerators.contains_key(&(domain, connector_type))
    }

    /// Resolves the enumerator or fails with a configuration error.
    pub fn resolve(
        &self,
        domain: SyncDomain,
        connector_type: ConnectorType,
    ) -> AppResult<Arc<dyn WorkItemEnumerator>> {
        self.enumerators
            .get(&(domain, connector_type))
            .cloned()
            .ok_or_else(|| {
                AppError::Unsupported(format!(
                    "no {domain} enumerator registered for connector type '{connector_type}'"
                ))
            })
    }
}
