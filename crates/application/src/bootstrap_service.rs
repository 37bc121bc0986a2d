//! One-shot primary worker bootstrap run at process start.
//!
//! Waits for dependencies, elects the primary through the cluster-wide lock
//! and, on the primary only, wipes coordination state left by a previous
//! incarnation and cancels index attempts it orphaned.

use std::sync::Arc;
use std::time::Duration;

use synccoord_core::{AppError, AppResult};
use synccoord_domain::{PRIMARY_WORKER_LOCK_KEY, SyncDomain, SyncKeys};
use tracing::{debug, error, info, warn};

use crate::distributed_lock::DistributedLock;
use crate::primary::PrimaryDesignation;
use crate::resource_fence::ResourceSyncFence;
use crate::sync_ports::{
    CoordinationStore, DependencyProbe, IndexAttemptStatus, LockCoordinator, SyncRepository,
};


/// Reason stored on index attempts canceled by a fresh primary.
pub const ORPHANED_ATTEMPT_REASON: &str =
    "Canceled on primary worker startup: attempt was orphaned by a previous worker crash";

/// Bootstrap state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Probing store, database, and document index.
    WaitingForDependencies,
    /// Competing for the primary lock.
    ElectingPrimary,
    /// Lost the election; the worker only consumes tasks.
    DoneNonPrimary,
    /// Deleting every fence and tracker key.
    ResettingState,
    /// Canceling in-progress attempts without a fence.
    CancelingOrphans,
    /// Primary initialization finished.
    DonePrimary,
}

impl BootstrapState {
    /// Returns stable log value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForDependencies => "waiting_for_dependencies",
            Self::ElectingPrimary => "electing_primary",
            Self::DoneNonPrimary => "done_non_primary",
            Self::ResettingState => "resetting_state",
            Self::CancelingOrphans => "canceling_orphans",
            Self::DonePrimary => "done_primary",
        }
    }
}

/// Bootstrap configuration.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Identity written into the primary lock token.
    pub holder_id: String,
    /// Primary lock TTL; the election blocks for half of it.
    pub primary_lock_ttl: Duration,
    /// Probe attempts per dependency before giving up.
    pub probe_attempts: u32,
    /// Delay between probe attempts.
    pub probe_delay: Duration,
    /// Whether losing the election is fatal.
    pub require_primary: bool,
}

/// Result of a finished bootstrap.
pub struct BootstrapOutcome {
    /// Primacy capability handed to the rest of the worker.
    pub designation: PrimaryDesignation,
    /// Terminal state reached.
    pub final_state: BootstrapState,
    /// Orphaned index attempts successfully canceled.
    pub canceled_orphans: usize,
}

/// Runs the bootstrap state machine.
pub struct PrimaryWorkerBootstrap {
    store: Arc<dyn CoordinationStore>,
    locks: Arc<dyn LockCoordinator>,
    repository: Arc<dyn SyncRepository>,
    probes: Vec<Arc<dyn DependencyProbe>>,
    config: BootstrapConfig,
}

impl PrimaryWorkerBootstrap {
    /// Creates the bootstrap.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        locks: Arc<dyn LockCoordinator>,
        repository: Arc<dyn SyncRepository>,
        probes: Vec<Arc<dyn DependencyProbe>>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            store,
            locks,
            repository,
            probes,
            config,
        }
    }

    /// Runs every state once. Errors returned from here are fatal.
    pub async fn run(&self) -> AppResult<BootstrapOutcome> {
        enter(BootstrapState::WaitingForDependencies);
        self.wait_for_dependencies().await?;

        enter(BootstrapState::ElectingPrimary);
        let Some(lock) = self.elect().await? else {
            enter(BootstrapState::DoneNonPrimary);
            return Ok(BootstrapOutcome {
                designation: PrimaryDesignation::secondary(),
                final_state: BootstrapState::DoneNonPrimary,
                canceled_orphans: 0,
            });
        };
        let designation = PrimaryDesignation::primary(lock);

        self.log_replication().await;

        enter(BootstrapState::ResettingState);
        if let Err(error) = self.reset_state().await {
            designation.release().await;
            return Err(AppError::Fatal(format!(
                "failed to reset coordination state: {error}"
            )));
        }

        enter(BootstrapState::CancelingOrphans);
        let canceled_orphans = match self.cancel_orphans().await {
            Ok(canceled) => canceled,
            Err(error) => {
                error!(error = %error, "failed to list orphaned index attempts");
                0
            }
        };

        enter(BootstrapState::DonePrimary);
        Ok(BootstrapOutcome {
            designation,
            final_state: BootstrapState::DonePrimary,
            canceled_orphans,
        })
    }

    async fn wait_for_dependencies(&self) -> AppResult<()> {
        let attempts = self.config.probe_attempts.max(1);

        for probe in &self.probes {
            let mut attempt = 1;
            loop {
                match probe.ping().await {
                    Ok(()) => {
                        debug!(dependency = probe.name(), attempt, "dependency is reachable");
                        break;
                    }
                    Err(error) if attempt < attempts => {
                        warn!(
                            dependency = probe.name(),
                            attempt,
                            max_attempts = attempts,
                            error = %error,
                            "dependency not reachable yet"
                        );
                        attempt += 1;
                        tokio::time::sleep(self.config.probe_delay).await;
                    }
                    Err(error) => {
                        return Err(AppError::Fatal(format!(
                            "dependency '{}' unreachable after {attempts} attempts: {error}",
                            probe.name()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    async fn elect(&self) -> AppResult<Option<DistributedLock>> {
        let ttl = self.config.primary_lock_ttl;
        let mut lock = DistributedLock::new(
            self.locks.clone(),
            PRIMARY_WORKER_LOCK_KEY,
            self.config.holder_id.as_str(),
            ttl,
        );

        let acquired = lock
            .acquire(Some(ttl / 2))
            .await
            .map_err(|error| AppError::Fatal(format!("primary election failed: {error}")))?;

        if acquired {
            info!(holder_id = %self.config.holder_id, "elected primary worker");
            return Ok(Some(lock));
        }

        if self.config.require_primary {
            return Err(AppError::Fatal(
                "another worker holds the primary lock and is presumably healthy".to_owned(),
            ));
        }

        info!(
            holder_id = %self.config.holder_id,
            "another worker is primary, continuing as secondary"
        );
        Ok(None)
    }

    async fn log_replication(&self) {
        match self.store.replication_info().await {
            Ok(replication) => info!(
                role = %replication.role,
                connected_replicas = replication.connected_replicas,
                "coordination store replication"
            ),
            Err(error) => warn!(error = %error, "failed to read store replication info"),
        }
    }

    async fn reset_state(&self) -> AppResult<()> {
        for domain in SyncDomain::ALL {
            let mut deleted = 0;
            for pattern in SyncKeys::new(domain).reset_patterns() {
                deleted += self.store.delete_matching(pattern.as_str()).await?;
            }
            info!(domain = %domain, deleted, "reset coordination state");
        }
        Ok(())
    }

    async fn cancel_orphans(&self) -> AppResult<usize> {
        let attempts = self.repository.list_in_progress_index_attempts().await?;
        let mut canceled = 0;

        for attempt in attempts {
            let fence =
                ResourceSyncFence::new(self.store.clone(), SyncDomain::Indexing, attempt.resource_id);
            match fence.fenced().await {
                Ok(false) => {}
                Ok(true) => continue,
                Err(error) => {
                    warn!(
                        index_attempt_id = attempt.id,
                        error = %error,
                        "failed to read fence of index attempt"
                    );
                    continue;
                }
            }

            match self
                .repository
                .update_index_attempt(
                    attempt.id,
                    IndexAttemptStatus::Canceled,
                    Some(ORPHANED_ATTEMPT_REASON),
                )
                .await
            {
                Ok(()) => {
                    canceled += 1;
                    info!(
                        index_attempt_id = attempt.id,
                        resource_id = %attempt.resource_id,
                        "canceled orphaned index attempt"
                    );
                }
                Err(error) => error!(
                    index_attempt_id = attempt.id,
                    resource_id = %attempt.resource_id,
                    error = %error,
                    "failed to cancel orphaned index attempt"
                ),
            }
        }

        Ok(canceled)
    }
}

fn enter(state: BootstrapState) {
    info!(state = state.as_str(), "primary worker bootstrap");
}
