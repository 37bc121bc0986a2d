use super::*;

impl SyncCoordinatorService {
    /// Dispatches a generator for every due resource of one domain.
    ///
    /// Returns how many generators were enqueued. A failed dispatch is logged
    /// and the scan moves on to the next resource.
    pub async fn scan_and_dispatch(&self, domain: SyncDomain) -> AppResult<usize> {
        let now = Utc::now();
        let candidates = self.repository.list_sync_candidates(domain).await?;
        let mut triggered = 0;

        for resource in candidates
            .iter()
            .filter(|resource| self.schedule.is_due(domain, resource, now))
        {
            if !self.is_supported(domain, resource) {
                continue;
            }

            match self.try_dispatch(domain, resource.id).await {
                Ok(Some(_)) => triggered += 1,
                Ok(None) => {}
                Err(error) => error!(
                    domain = %domain,
                    resource_id = %resource.id,
                    error = %error,
                    "failed to dispatch sync generator"
                ),
            }
        }

        if triggered > 0 {
            info!(domain = %domain, triggered, "scan dispatched sync generators");
        }
        Ok(triggered)
    }

    fn is_supported(&self, domain: SyncDomain, resource: &SyncResource) -> bool {
        let supported = self.enumerators.supports(domain, resource.connector_type);
        if !supported {
            debug!(
                domain = %domain,
                resource_id = %resource.id,
                connector_type = %resource.connector_type,
                "no enumerator for connector type, skipping resource"
            );
        }
        supported
    }
}
