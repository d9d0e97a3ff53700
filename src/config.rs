//! Settings for the worker and enqueue commands.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `configs/config.yaml` (optional)
//! 3. `WORKHORSE_*` environment variables, nested with `__`
//!    (`WORKHORSE_REDIS__ADDR`, `WORKHORSE_POOL__SIZE`, ...)
//! 4. the short legacy names `REDIS_ADDR`, `WORKER_COUNT`,
//!    `JOB_MAX_RETRIES`, `JOB_RETRY_DELAY` and `SIMULATE_FAIL`

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::value::{Uncased, UncasedStr};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::pool::{resolve_pool_size, PoolOptions};
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use crate::storage::redis::redis_url;

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
pub const ENV_PREFIX: &str = "WORKHORSE_";

const LEGACY_ENV: &[&str] = &[
    "REDIS_ADDR",
    "WORKER_COUNT",
    "JOB_MAX_RETRIES",
    "JOB_RETRY_DELAY",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Redis,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub transport: TransportKind,
    pub redis: RedisSettings,
    pub sqlite: SqliteSettings,
    pub pool: PoolSettings,
    pub retry: RetrySettings,
    pub metrics: MetricsSettings,
    pub log: LogSettings,
    pub simulate: SimulateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// `host:port`, or a full `redis://` URL
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    pub queue_key: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            password: None,
            db: 0,
            queue_key: "jobs".to_string(),
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        redis_url(&self.addr, self.password.as_deref(), self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub url: String,
    pub queue_key: String,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://workhorse.db?mode=rwc".to_string(),
            queue_key: "jobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of workers; zero or negative selects the default
    pub size: i64,
    pub poll_interval_ms: u64,
    /// Zero disables queue-depth sampling
    pub depth_sample_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 0,
            poll_interval_ms: 1000,
            depth_sample_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Address for the Prometheus endpoint; unset means no endpoint
    pub listen_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulateSettings {
    /// Attempts that fail before the simulated job succeeds
    pub fail_attempts: u32,
    pub work_ms: u64,
}

impl Default for SimulateSettings {
    fn default() -> Self {
        Self {
            fail_attempts: 0,
            work_ms: 2000,
        }
    }
}

impl Settings {
    /// Load from the default file location and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Env::raw().only(LEGACY_ENV).map(legacy_key));

        // `SIMULATE_FAIL=1` is shorthand for two failing attempts per job.
        if std::env::var("SIMULATE_FAIL").is_ok_and(|v| v == "1") {
            figment = figment.merge(("simulate.fail_attempts", 2));
        }

        figment
    }

    pub fn pool_size(&self) -> usize {
        resolve_pool_size(self.pool.size)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_retries, self.retry.delay_secs)
    }

    pub fn pool_options(&self) -> PoolOptions {
        let depth = match self.pool.depth_sample_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        PoolOptions::default()
            .with_size(self.pool.size)
            .with_poll_interval(Duration::from_millis(self.pool.poll_interval_ms))
            .with_policy(self.retry_policy())
            .with_depth_sampling(depth)
    }
}

fn legacy_key(key: &UncasedStr) -> Uncased<'_> {
    let mapped = match key.as_str().to_ascii_uppercase().as_str() {
        "REDIS_ADDR" => "redis.addr",
        "WORKER_COUNT" => "pool.size",
        "JOB_MAX_RETRIES" => "retry.max_retries",
        "JOB_RETRY_DELAY" => "retry.delay_secs",
        _ => return Uncased::from(key.as_str()),
    };
    mapped.into()
}
