use std::thread::JoinHandle;
use std::time::Duration;

use synccoord_core::{AppError, AppResult};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::primary::PrimaryDesignation;

const MIN_RENEWAL_INTERVAL: Duration = Duration::from_millis(100);

/// What one renewal firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTick {
    /// This worker is not primary.
    NotPrimary,
    /// The held lock was extended.
    Renewed,
    /// The lock had been lost and was taken again.
    Reelected,
}

/// Keeps the primary lock alive for the lifetime of the process.
#[derive(Clone)]
pub struct PrimaryLockRenewal {
    designation: PrimaryDesignation,
}

/// Running renewal thread.
pub struct RenewalHandle {
    thread: JoinHandle<()>,
    /// Resolves when the primary lock is lost for good.
    pub fatal: oneshot::Receiver<AppError>,
}

impl RenewalHandle {
    /// Waits for the thread to exit after shutdown was signalled.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("primary lock renewal thread panicked");
        }
    }
}

impl PrimaryLockRenewal {
    /// Creates the renewal loop for a designation.
    #[must_use]
    pub fn new(designation: PrimaryDesignation) -> Self {
        Self { designation }
    }

    /// Renews the lock once, re-electing when it was lost.
    ///
    /// A failed re-election is returned as [`AppError::Fatal`].
    pub async fn tick(&self) -> AppResult<RenewalTick> {
        let Some(lock) = self.designation.lock() else {
            return Ok(RenewalTick::NotPrimary);
        };
        let mut lock = lock.lock().await;

        if lock.owned().await? {
            if lock.reacquire().await? {
                debug!(lock_key = lock.key(), "renewed primary lock");
                return Ok(RenewalTick::Renewed);
            }
            warn!(lock_key = lock.key(), "primary lock lost during renewal");
        } else {
            warn!(lock_key = lock.key(), "primary lock no longer owned");
        }

        let blocking_timeout = lock.ttl() / 2;
        if lock.acquire(Some(blocking_timeout)).await? {
            info!(lock_key = lock.key(), "re-elected primary worker");
            return Ok(RenewalTick::Reelected);
        }

        Err(AppError::Fatal(format!(
            "primary lock '{}' was taken by another worker",
            lock.key()
        )))
    }

    /// Runs the loop until shutdown flips, renewing every `ttl / 8`.
    ///
    /// Non-fatal errors are logged and the loop keeps going.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        fatal: oneshot::Sender<AppError>,
    ) {
        let interval = interval.max(MIN_RENEWAL_INTERVAL);
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match self.tick().await {
                Ok(_) => {}
                Err(error) if error.is_fatal() => {
                    error!(error = %error, "primary lock renewal failed");
                    if fatal.send(error).is_err() {
                        warn!("renewal failure receiver already dropped");
                    }
                    return;
                }
                Err(error) => warn!(error = %error, "primary lock renewal firing failed"),
            }
        }

        debug!("primary lock renewal stopped");
    }

    /// Starts the loop on a dedicated thread with its own runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> AppResult<RenewalHandle> {
        let interval = self.renewal_interval();
        let (fatal_sender, fatal) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("primary-lock-renewal".to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        let fatal = AppError::Fatal(format!(
                            "failed to start primary lock renewal runtime: {error}"
                        ));
                        if fatal_sender.send(fatal).is_err() {
                            warn!("renewal failure receiver already dropped");
                        }
                        return;
                    }
                };
                runtime.block_on(self.run(interval, shutdown, fatal_sender));
            })
            .map_err(|error| {
                AppError::Internal(format!("failed to spawn primary lock renewal thread: {error}"))
            })?;

        Ok(RenewalHandle { thread, fatal })
    }

    fn renewal_interval(&self) -> Duration {
        self.designation
            .lock_ttl()
            .map_or(MIN_RENEWAL_INTERVAL, |ttl| ttl / 8)
    }
}
