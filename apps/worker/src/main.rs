//! Synccoord sync worker runtime.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use synccoord_application::{
    BeatJob, BootstrapConfig, CoordinationStore, DeletionEnumerator, DependencyProbe,
    EnumeratorRegistry, LockCoordinator, PrimaryDesignation, PrimaryLockRenewal,
    PrimaryWorkerBootstrap, PruningEnumerator, SyncCoordinatorService, SyncRepository,
    SyncSchedule, SyncSettings, SyncTaskRouter, TaskQueue,
};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{ConnectorType, QueueLane, SyncDomain};
use synccoord_infrastructure::{
    HttpConnectorEnumerator, HttpConnectorGateway, HttpDocumentIndex, HttpHealthProbe,
    HttpRetryPolicy, InMemoryCoordinationStore, InMemoryLockCoordinator, InMemoryTaskQueue,
    PostgresDependencyProbe, PostgresSyncRepository, RedisCoordinationStore,
    RedisDependencyProbe, RedisLockCoordinator, RedisTaskQueue,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;

struct CoordinationBackends {
    store: Arc<dyn CoordinationStore>,
    locks: Arc<dyn LockCoordinator>,
    queue: Arc<dyn TaskQueue>,
    probe: Option<Arc<dyn DependencyProbe>>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let retry = HttpRetryPolicy::new(config.http_max_attempts, config.http_retry_backoff_ms);

    let backends = build_coordination_backends(&config)?;
    let repository: Arc<dyn SyncRepository> = Arc::new(PostgresSyncRepository::new(pool.clone()));
    let gateway = Arc::new(HttpConnectorGateway::new(
        http_client.clone(),
        config.connector_gateway_url.as_str(),
        retry,
    ));
    let document_index = Arc::new(HttpDocumentIndex::new(
        http_client.clone(),
        config.document_index_url.as_str(),
        retry,
    ));

    let mut probes: Vec<Arc<dyn DependencyProbe>> = vec![Arc::new(PostgresDependencyProbe::new(pool))];
    probes.extend(backends.probe.clone());
    probes.push(Arc::new(HttpHealthProbe::new(
        "document_index",
        http_client.clone(),
        config.document_index_url.as_str(),
    )));
    probes.push(Arc::new(HttpHealthProbe::new(
        "connector_gateway",
        http_client,
        config.connector_gateway_url.as_str(),
    )));

    let bootstrap = PrimaryWorkerBootstrap::new(
        backends.store.clone(),
        backends.locks.clone(),
        repository.clone(),
        probes,
        BootstrapConfig {
            holder_id: config.worker_id.as_str().to_owned(),
            primary_lock_ttl: config.primary_lock_ttl,
            probe_attempts: config.probe_attempts,
            probe_delay: config.probe_delay,
            require_primary: config.require_primary,
        },
    );
    let outcome = bootstrap.run().await?;
    let designation = outcome.designation;

    info!(
        worker_id = %config.worker_id.as_str(),
        primary = designation.is_primary(),
        canceled_orphans = outcome.canceled_orphans,
        concurrency = config.concurrency,
        redis = config.redis_url.is_some(),
        "synccoord-worker started"
    );

    let (shutdown_sender, shutdown) = watch::channel(false);
    let mut renewal = if designation.is_primary() {
        Some(PrimaryLockRenewal::new(designation.clone()).spawn(shutdown.clone())?)
    } else {
        None
    };

    let service = SyncCoordinatorService::new(
        backends.store,
        backends.locks,
        backends.queue.clone(),
        repository.clone(),
        document_index,
        build_enumerators(gateway, repository),
        config.worker_id.as_str(),
    )
    .with_schedule(build_schedule(&config))
    .with_settings(build_settings(&config));

    let mut tasks = JoinSet::new();
    for domain in SyncDomain::ALL {
        tasks.spawn(run_beat_loop(
            service.clone(),
            BeatJob::Scan(domain),
            config.scan_interval,
            designation.clone(),
            shutdown.clone(),
        ));
    }
    tasks.spawn(run_beat_loop(
        service.clone(),
        BeatJob::Monitor,
        config.monitor_interval,
        designation.clone(),
        shutdown.clone(),
    ));

    let router = SyncTaskRouter::new(service);
    for consumer_index in 0..config.concurrency {
        tasks.spawn(run_consumer(
            format!("{}:{consumer_index}", config.worker_id.as_str()),
            router.clone(),
            backends.queue.clone(),
            config.lanes.clone(),
            config.poll_timeout,
            shutdown.clone(),
        ));
    }

    let fatal = match renewal.as_mut() {
        Some(handle) => tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                log_signal(signal);
                None
            }
            received = &mut handle.fatal => received.ok(),
        },
        None => {
            log_signal(tokio::signal::ctrl_c().await);
            None
        }
    };

    info!("shutting down synccoord-worker");
    if shutdown_sender.send(true).is_err() {
        warn!("every shutdown receiver was already dropped");
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            error!(error = %error, "worker task panicked");
        }
    }

    if let Some(handle) = renewal
        && tokio::task::spawn_blocking(move || handle.join()).await.is_err()
    {
        error!("failed to join primary lock renewal thread");
    }
    designation.release().await;

    match fatal {
        Some(error) => {
            error!(error = %error, "worker stopped after losing the primary lock");
            Err(error)
        }
        None => Ok(()),
    }
}

fn log_signal(signal: std::io::Result<()>) {
    if let Err(error) = signal {
        error!(error = %error, "failed to listen for shutdown signal");
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run database migrations: {error}")))
}

fn build_coordination_backends(config: &WorkerConfig) -> AppResult<CoordinationBackends> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        warn!("REDIS_URL is not set, using process-local coordination backends");
        return Ok(CoordinationBackends {
            store: Arc::new(InMemoryCoordinationStore::new()),
            locks: Arc::new(InMemoryLockCoordinator::new()),
            queue: Arc::new(InMemoryTaskQueue::new()),
            probe: None,
        });
    };

    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
    let prefix = config.redis_key_prefix.as_str();

    Ok(CoordinationBackends {
        store: Arc::new(RedisCoordinationStore::new(client.clone(), prefix)),
        locks: Arc::new(RedisLockCoordinator::new(client.clone(), prefix)),
        queue: Arc::new(RedisTaskQueue::new(client.clone(), prefix)),
        probe: Some(Arc::new(RedisDependencyProbe::new(client))),
    })
}

fn build_enumerators(
    gateway: Arc<HttpConnectorGateway>,
    repository: Arc<dyn SyncRepository>,
) -> EnumeratorRegistry {
    let access_controlled: Vec<ConnectorType> = ConnectorType::ALL
        .into_iter()
        .filter(ConnectorType::has_external_access)
        .collect();

    EnumeratorRegistry::new()
        .with_all(
            SyncDomain::Indexing,
            ConnectorType::ALL,
            Arc::new(HttpConnectorEnumerator::new(gateway.clone(), SyncDomain::Indexing)),
        )
        .with_all(
            SyncDomain::PermissionSync,
            access_controlled.clone(),
            Arc::new(HttpConnectorEnumerator::new(
                gateway.clone(),
                SyncDomain::PermissionSync,
            )),
        )
        .with_all(
            SyncDomain::ExternalGroupSync,
            access_controlled,
            Arc::new(HttpConnectorEnumerator::new(
                gateway.clone(),
                SyncDomain::ExternalGroupSync,
            )),
        )
        .with_all(
            SyncDomain::Pruning,
            ConnectorType::ALL,
            Arc::new(PruningEnumerator::new(repository.clone(), gateway)),
        )
        .with_all(
            SyncDomain::Deletion,
            ConnectorType::ALL,
            Arc::new(DeletionEnumerator::new(repository)),
        )
}

fn build_schedule(config: &WorkerConfig) -> SyncSchedule {
    let schedule = config
        .domain_periods
        .iter()
        .fold(SyncSchedule::default(), |schedule, (domain, period)| {
            schedule.with_domain_period(*domain, *period)
        });

    config.connector_periods.iter().fold(
        schedule,
        |schedule, ((domain, connector_type), period)| {
            schedule.with_connector_period(*domain, *connector_type, *period)
        },
    )
}

fn build_settings(config: &WorkerConfig) -> SyncSettings {
    let mut settings = SyncSettings::default();
    settings.beat_timeout = config.beat_timeout;
    settings.beat_requires_primary = config.beat_requires_primary;

    config
        .fence_timeouts
        .iter()
        .fold(settings, |settings, (domain, seconds)| {
            let seconds = i64::try_from(*seconds).unwrap_or(i64::MAX);
            settings.with_fence_timeout(*domain, chrono_seconds(seconds))
        })
}

fn chrono_seconds(seconds: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(seconds).unwrap_or(chrono::Duration::MAX)
}

async fn run_beat_loop(
    service: SyncCoordinatorService,
    job: BeatJob,
    interval: Duration,
    designation: PrimaryDesignation,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let outcome = service.run_beat(job, &designation).await;
        debug!(job = %job.name(), outcome = ?outcome, "beat fired");
    }
}

async fn run_consumer(
    consumer: String,
    router: SyncTaskRouter,
    queue: Arc<dyn TaskQueue>,
    lanes: Vec<QueueLane>,
    poll_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    // Tasks a previous run of this consumer popped but never finished.
    match queue.requeue_unacknowledged(consumer.as_str()).await {
        Ok(0) => {}
        Ok(requeued) => info!(consumer = %consumer, requeued, "recovered unacknowledged tasks"),
        Err(error) => warn!(
            consumer = %consumer,
            error = %error,
            "failed to recover unacknowledged tasks"
        ),
    }

    // Receives are never cancelled mid-flight so a claimed task is always run.
    while !*shutdown.borrow() {
        match queue.receive(consumer.as_str(), &lanes, poll_timeout).await {
            Ok(Some(delivery)) => {
                let envelope = &delivery.envelope;
                if let Err(error) = router.execute(envelope).await {
                    warn!(
                        consumer = %consumer,
                        task = envelope.task.task_name(),
                        task_id = %envelope.task_id,
                        error = %error,
                        "task failed"
                    );
                }
                if let Err(error) = queue.acknowledge(consumer.as_str(), &delivery).await {
                    warn!(
                        consumer = %consumer,
                        task_id = %envelope.task_id,
                        error = %error,
                        "failed to acknowledge task"
                    );
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!(consumer = %consumer, error = %error, "failed to receive task");
                tokio::time::sleep(poll_timeout).await;
            }
        }
    }

    debug!(consumer = %consumer, "consumer stopped");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
