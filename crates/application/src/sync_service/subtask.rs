use super::*;

impl SyncCoordinatorService {
    /// Processes one work item and always removes its token from the tracker.
    ///
    /// Item failures are logged and reported as `false`, never returned.
    pub async fn process_item(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        item_token: &str,
        item: &SyncWorkItem,
    ) -> bool {
        let result = self.apply_item(resource_id, item).await;

        let fence = self.fence(domain, resource_id);
        match fence.remove_task(item_token).await {
            Ok(true) => {}
            Ok(false) => debug!(
                domain = %domain,
                resource_id = %resource_id,
                item_token = %item_token,
                "item token was no longer tracked"
            ),
            Err(error) => error!(
                domain = %domain,
                resource_id = %resource_id,
                item_token = %item_token,
                error = %error,
                "failed to remove item token from tracker"
            ),
        }

        match result {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    domain = %domain,
                    resource_id = %resource_id,
                    document_id = %item.document_id,
                    payload_type = item.payload.payload_type(),
                    error = %error,
                    "work item failed"
                );
                false
            }
        }
    }

    async fn apply_item(&self, resource_id: ResourceId, item: &SyncWorkItem) -> AppResult<()> {
        let document_id = item.document_id.as_str();

        match &item.payload {
            WorkItemPayload::IndexDocument {
                title,
                content,
                source_url,
            } => {
                self.repository
                    .upsert_document(
                        resource_id,
                        document_id,
                        title.as_str(),
                        source_url.as_deref(),
                    )
                    .await?;
                self.document_index
                    .upsert(&[IndexDocumentUpdate {
                        document_id: document_id.to_owned(),
                        resource_id,
                        title: Some(title.clone()),
                        content: Some(content.clone()),
                        access: None,
                    }])
                    .await
            }
            WorkItemPayload::ExternalAccess { access } => {
                self.repository
                    .upsert_document_access(resource_id, document_id, access)
                    .await?;
                self.document_index
                    .upsert(&[IndexDocumentUpdate {
                        document_id: document_id.to_owned(),
                        resource_id,
                        title: None,
                        content: None,
                        access: Some(access.clone()),
                    }])
                    .await
            }
            WorkItemPayload::ExternalGroup { user_emails } => {
                self.repository
                    .upsert_external_group(resource_id, document_id, user_emails)
                    .await
            }
            WorkItemPayload::RemoveDocument => {
                self.document_index
                    .delete(&[document_id.to_owned()])
                    .await?;
                self.repository
                    .delete_document(resource_id, document_id)
                    .await
            }
        }
    }
}
