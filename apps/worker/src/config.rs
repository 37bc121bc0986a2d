use std::collections::HashMap;
use std::env;
use std::time::Duration;

use synccoord_core::{AppError, AppResult, NonEmptyString};
use synccoord_domain::{ConnectorType, QueueLane, SyncDomain};

/// Runtime configuration read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub run_migrations: bool,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub document_index_url: String,
    pub connector_gateway_url: String,
    pub http_max_attempts: u8,
    pub http_retry_backoff_ms: u64,
    pub worker_id: NonEmptyString,
    pub concurrency: usize,
    pub lanes: Vec<QueueLane>,
    pub poll_timeout: Duration,
    pub primary_lock_ttl: Duration,
    pub require_primary: bool,
    pub beat_requires_primary: bool,
    pub probe_attempts: u32,
    pub probe_delay: Duration,
    pub scan_interval: Duration,
    pub beat_timeout: Duration,
    pub monitor_interval: Duration,
    pub domain_periods: HashMap<SyncDomain, u32>,
    pub connector_periods: HashMap<(SyncDomain, ConnectorType), u32>,
    pub fence_timeouts: HashMap<SyncDomain, u64>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let env = EnvReader { lookup };

        let database_url = env.required("DATABASE_URL")?;
        let redis_url = env.optional("REDIS_URL");
        let worker_id = match env.optional("WORKER_ID") {
            Some(worker_id) => NonEmptyString::new(worker_id)?,
            None => NonEmptyString::new(format!("worker-{}", std::process::id()))?,
        };
        let lanes = match env.optional("WORKER_LANES") {
            Some(value) => parse_lanes(value.as_str())?,
            None => QueueLane::ALL.to_vec(),
        };

        let concurrency = env.usize("WORKER_CONCURRENCY", 4)?;
        let poll_timeout_ms = env.u64("WORKER_POLL_TIMEOUT_MS", 2000)?;
        let primary_lock_ttl_seconds = env.u64("PRIMARY_LOCK_TTL_SECONDS", 120)?;
        let probe_attempts = env.u32("DEPENDENCY_PROBE_ATTEMPTS", 10)?;
        let probe_delay_ms = env.u64("DEPENDENCY_PROBE_DELAY_MS", 3000)?;
        let scan_interval_seconds = env.u64("SCAN_INTERVAL_SECONDS", 15)?;
        let scan_timeout_seconds = env.u64("SCAN_TIMEOUT_SECONDS", 300)?;
        let monitor_interval_seconds = env.u64("MONITOR_INTERVAL_SECONDS", 15)?;
        let http_max_attempts = env.u8("HTTP_MAX_ATTEMPTS", 3)?;

        for (name, value) in [
            ("WORKER_CONCURRENCY", concurrency as u64),
            ("WORKER_POLL_TIMEOUT_MS", poll_timeout_ms),
            ("PRIMARY_LOCK_TTL_SECONDS", primary_lock_ttl_seconds),
            ("DEPENDENCY_PROBE_ATTEMPTS", u64::from(probe_attempts)),
            ("SCAN_INTERVAL_SECONDS", scan_interval_seconds),
            ("SCAN_TIMEOUT_SECONDS", scan_timeout_seconds),
            ("MONITOR_INTERVAL_SECONDS", monitor_interval_seconds),
            ("HTTP_MAX_ATTEMPTS", u64::from(http_max_attempts)),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let mut domain_periods = HashMap::new();
        let mut connector_periods = HashMap::new();
        let mut fence_timeouts = HashMap::new();
        for domain in SyncDomain::ALL {
            let prefix = domain.as_str().to_uppercase();

            // Deletion is driven by resource status, not by a period.
            if domain != SyncDomain::Deletion {
                let name = format!("{prefix}_PERIOD_SECONDS");
                if let Some(period) = env.optional_u32(name.as_str())? {
                    domain_periods.insert(domain, period);
                }

                for connector_type in ConnectorType::ALL {
                    let name = format!(
                        "{prefix}_{}_PERIOD_SECONDS",
                        connector_type.as_str().to_uppercase()
                    );
                    if let Some(period) = env.optional_u32(name.as_str())? {
                        connector_periods.insert((domain, connector_type), period);
                    }
                }
            }

            if let Some(timeout) = env.optional_u64(format!("{prefix}_TIMEOUT_SECONDS").as_str())? {
                fence_timeouts.insert(domain, timeout);
            }
        }

        Ok(Self {
            database_url,
            run_migrations: env.bool("RUN_MIGRATIONS", true)?,
            redis_url,
            redis_key_prefix: env
                .optional("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| "synccoord".to_owned()),
            document_index_url: env
                .optional("DOCUMENT_INDEX_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_owned()),
            connector_gateway_url: env
                .optional("CONNECTOR_GATEWAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8090".to_owned()),
            http_max_attempts,
            http_retry_backoff_ms: env.u64("HTTP_RETRY_BACKOFF_MS", 250)?,
            worker_id,
            concurrency,
            lanes,
            poll_timeout: Duration::from_millis(poll_timeout_ms),
            primary_lock_ttl: Duration::from_secs(primary_lock_ttl_seconds),
            require_primary: env.bool("WORKER_REQUIRE_PRIMARY", true)?,
            beat_requires_primary: env.bool("BEAT_REQUIRES_PRIMARY", true)?,
            probe_attempts,
            probe_delay: Duration::from_millis(probe_delay_ms),
            scan_interval: Duration::from_secs(scan_interval_seconds),
            beat_timeout: Duration::from_secs(scan_timeout_seconds),
            monitor_interval: Duration::from_secs(monitor_interval_seconds),
            domain_periods,
            connector_periods,
            fence_timeouts,
        })
    }
}

fn parse_lanes(value: &str) -> AppResult<Vec<QueueLane>> {
    let mut lanes = Vec::new();
    for lane in value.split(',').filter(|lane| !lane.trim().is_empty()) {
        let lane = QueueLane::parse(lane)?;
        if !lanes.contains(&lane) {
            lanes.push(lane);
        }
    }

    if lanes.is_empty() {
        return Err(AppError::Validation(
            "WORKER_LANES must name at least one lane".to_owned(),
        ));
    }

    Ok(lanes)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn parsed<T>(&self, name: &str) -> AppResult<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(name)
            .map(|value| {
                value.parse::<T>().map_err(|error| {
                    AppError::Validation(format!("invalid {name} value '{value}': {error}"))
                })
            })
            .transpose()
    }

    fn usize(&self, name: &str, default: usize) -> AppResult<usize> {
        Ok(self.parsed(name)?.unwrap_or(default))
    }

    fn u8(&self, name: &str, default: u8) -> AppResult<u8> {
        Ok(self.parsed(name)?.unwrap_or(default))
    }

    fn u32(&self, name: &str, default: u32) -> AppResult<u32> {
        Ok(self.parsed(name)?.unwrap_or(default))
    }

    fn u64(&self, name: &str, default: u64) -> AppResult<u64> {
        Ok(self.parsed(name)?.unwrap_or(default))
    }

    fn optional_u32(&self, name: &str) -> AppResult<Option<u32>> {
        let value = self.parsed::<u32>(name)?;
        if value == Some(0) {
            return Err(AppError::Validation(format!(
                "{name} must be greater than zero"
            )));
        }
        Ok(value)
    }

    fn optional_u64(&self, name: &str) -> AppResult<Option<u64>> {
        let value = self.parsed::<u64>(name)?;
        if value == Some(0) {
            return Err(AppError::Validation(format!(
                "{name} must be greater than zero"
            )));
        }
        Ok(value)
    }

    fn bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(AppError::Validation(format!(
                    "invalid {name} value '{value}': expected true or false"
                ))),
            },
        }
    }
}
