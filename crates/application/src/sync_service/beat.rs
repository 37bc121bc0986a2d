use super::*;

/// Periodic job run by the worker's beat schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatJob {
    /// Scan-and-dispatch for one domain.
    Scan(SyncDomain),
    /// Completion monitor sweep over every domain.
    Monitor,
}

impl BeatJob {
    /// Beat lock preventing overlapping firings of this job.
    #[must_use]
    pub fn lock_key(&self) -> String {
        match self {
            Self::Scan(domain) => SyncKeys::new(*domain).beat_lock(),
            Self::Monitor => SyncKeys::completion_monitor_beat_lock().to_owned(),
        }
    }

    /// Job name used in logs.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Scan(domain) => format!("{domain}_scan"),
            Self::Monitor => "completion_monitor".to_owned(),
        }
    }
}

/// What one beat firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatOutcome {
    /// The job is reserved to the primary worker.
    NotPrimary,
    /// A previous firing still holds the beat lock.
    Overlapping,
    /// The job ran; carries how many cycles it started or finalized.
    Completed(usize),
    /// The job exceeded the beat timeout.
    TimedOut,
    /// The job failed; the error was logged.
    Failed,
}

impl SyncCoordinatorService {
    /// Runs one beat job under its beat lock, swallowing failures.
    pub async fn run_beat(&self, job: BeatJob, primary: &PrimaryDesignation) -> BeatOutcome {
        if self.settings.beat_requires_primary && !primary.is_primary() {
            return BeatOutcome::NotPrimary;
        }

        let timeout = self.settings.beat_timeout;
        let mut beat_lock = self.lock(job.lock_key(), timeout);
        match beat_lock.acquire(None).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job = %job.name(), "beat lock held by another firing, skipping");
                return BeatOutcome::Overlapping;
            }
            Err(error) => {
                error!(job = %job.name(), error = %error, "failed to take beat lock");
                return BeatOutcome::Failed;
            }
        }

        let run = async {
            match job {
                BeatJob::Scan(domain) => self.scan_and_dispatch(domain).await,
                BeatJob::Monitor => self.monitor_fences().await,
            }
        };
        let result = tokio::time::timeout(timeout, run)
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Timeout(format!(
                    "{} exceeded {} seconds",
                    job.name(),
                    timeout.as_secs()
                )))
            });

        beat_lock.release().await;

        match result {
            Ok(count) => BeatOutcome::Completed(count),
            Err(AppError::Timeout(message)) => {
                info!(job = %job.name(), "{message}");
                BeatOutcome::TimedOut
            }
            Err(error) => {
                error!(job = %job.name(), error = %error, "beat job failed");
                BeatOutcome::Failed
            }
        }
    }
}
