use std::{path::PathBuf, str::FromStr, time::Duration};

use harvest_client::ClientConfig;
use harvest_core::{BackoffPolicy, BatchConfig, SchedulerConfig};
use harvest_observe::{LoggerConfig, LoggerFormat, SpanEvents};
use thiserror::Error;

const PREFIX: &str = "HARVEST_";

/// Upper bound for every interval setting.
const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting HARVEST_{0}")]
    Missing(&'static str),

    #[error("invalid value for HARVEST_{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// External collector program whose stdout carries one JSON record per line.
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Time the collector gets to exit after SIGTERM before it is killed.
    pub stop_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub client: ClientConfig,
    pub token_id: String,
    pub token: String,
    pub scheduler: SchedulerConfig,
    pub collector: CollectorConfig,
    pub logger: LoggerConfig,
}

impl AgentConfig {
    /// Read `HARVEST_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(format!("{PREFIX}{key}")).ok())
    }

    /// Build the configuration from an un-prefixed key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let client = ClientConfig {
            base_url: required("URL")?,
            proxy: get("PROXY"),
            request_timeout: secs(&get, "REQUEST_TIMEOUT_SECS", 30)?,
            ingest_wait: secs(&get, "INGEST_WAIT_SECS", 60)?,
            ..Default::default()
        };

        let scheduler = SchedulerConfig {
            tick: secs(&get, "TICK_SECS", 5)?,
            batch: BatchConfig {
                max_size: parse(&get, "BATCH_SIZE", 256)?,
                max_wait: secs(&get, "BATCH_WAIT_SECS", 10)?,
            },
            backoff: BackoffPolicy {
                max_attempts: parse(&get, "RETRY_ATTEMPTS", 3)?,
                base: parse(&get, "RETRY_BASE", 5)?,
                unit: Duration::from_secs(1),
            },
            source_type: get("SOURCE_TYPE").unwrap_or_else(|| "azure".to_string()),
            shutdown_grace: secs(&get, "SHUTDOWN_GRACE_SECS", 10)?,
        };

        let collector = CollectorConfig {
            program: required("COLLECTOR")?,
            args: get("COLLECTOR_ARGS")
                .map(|a| a.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            cwd: get("COLLECTOR_CWD").map(PathBuf::from),
            stop_grace: secs(&get, "COLLECTOR_STOP_GRACE_SECS", 5)?,
        };

        let mut logger = LoggerConfig::default();
        if let Some(level) = get("LOG_LEVEL") {
            logger.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            logger.format = LoggerFormat::from_str(&format).map_err(|e| ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason: e.to_string(),
            })?;
        }

        if let Some(mode) = get("LOG_SPAN_EVENTS") {
            logger.span_events = SpanEvents::from_str(&mode).map_err(|e| ConfigError::Invalid {
                key: "LOG_SPAN_EVENTS",
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            client,
            token_id: required("TOKEN_ID")?,
            token: required("TOKEN")?,
            scheduler,
            collector,
            logger,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if self.token_id.trim().is_empty() {
            return Err(ConfigError::Missing("TOKEN_ID"));
        }
        if self.token.is_empty() {
            return Err(ConfigError::Missing("TOKEN"));
        }
        if self.collector.program.trim().is_empty() {
            return Err(ConfigError::Missing("COLLECTOR"));
        }
        for (key, value) in [
            ("TICK_SECS", self.scheduler.tick),
            ("BATCH_WAIT_SECS", self.scheduler.batch.max_wait),
        ] {
            if value.is_zero() {
                return Err(invalid(key, "must be positive"));
            }
        }
        for (key, value) in [
            ("TICK_SECS", self.scheduler.tick),
            ("BATCH_WAIT_SECS", self.scheduler.batch.max_wait),
            ("SHUTDOWN_GRACE_SECS", self.scheduler.shutdown_grace),
            ("REQUEST_TIMEOUT_SECS", self.client.request_timeout),
            ("INGEST_WAIT_SECS", self.client.ingest_wait),
            ("COLLECTOR_STOP_GRACE_SECS", self.collector.stop_grace),
        ] {
            if value > MAX_INTERVAL {
                return Err(invalid(key, "must not exceed one week"));
            }
        }
        if self.scheduler.batch.max_size == 0 {
            return Err(invalid("BATCH_SIZE", "must be positive"));
        }
        if self.scheduler.backoff.max_attempts == 0 {
            return Err(invalid("RETRY_ATTEMPTS", "at least one attempt is required"));
        }
        if self.scheduler.backoff.base == 0 {
            return Err(invalid("RETRY_BASE", "must be positive"));
        }
        if self.scheduler.source_type.trim().is_empty() {
            return Err(invalid("SOURCE_TYPE", "must not be blank"));
        }
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&'static str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}

fn secs<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
{
    parse(get, key, default).map(Duration::from_secs)
}
