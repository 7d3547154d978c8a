//! Configuration management.
//!
//! Settings come from an optional YAML file layered under environment
//! variables prefixed with `FIXED_QUOTA` and separated by `__`, e.g.
//! `FIXED_QUOTA__RATELIMIT__LIMIT=10`. Every field has a default.
//!
//! ```yaml
//! logger:
//!   level: debug
//!   format: json
//! ratelimit:
//!   driver: redis
//!   limit: 100
//!   frequency_ms: 60000
//!   redis_option:
//!     host: 127.0.0.1
//!     port: 6379
//!     max_retry: 100
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::{ConfigError, Result};

const ENV_PREFIX: &str = "FIXED_QUOTA";

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Limiter configuration
    #[serde(default)]
    pub ratelimit: RateLimitSettings,
}

impl Settings {
    /// Load settings from an optional YAML file and the environment.
    ///
    /// A missing file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()).into())
    }

    /// Parse settings from a YAML document, without consulting the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()).into())
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Console,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Filter directive, e.g. `info` or `fixed_quota=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Limiter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Counter store driver
    #[serde(default)]
    pub driver: Driver,

    /// Units per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in milliseconds
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,

    /// Remote store connection
    #[serde(default)]
    pub redis_option: RedisOption,
}

impl RateLimitSettings {
    /// Window length.
    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            driver: Driver::default(),
            limit: default_limit(),
            frequency_ms: default_frequency_ms(),
            redis_option: RedisOption::default(),
        }
    }
}

fn default_limit() -> u64 {
    60
}

fn default_frequency_ms() -> u64 {
    60_000
}

/// Connection parameters for the Redis counter store.
///
/// Consumed once by [`RateLimiter::configure`](crate::RateLimiter::configure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisOption {
    /// Server host
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Database index
    #[serde(default)]
    pub db: i64,

    /// Password, empty for none
    #[serde(default)]
    pub password: String,

    /// Connections opened eagerly when the pool is created
    #[serde(default = "default_min_idle_conns")]
    pub min_idle_conns: usize,

    /// Maximum pool size
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Connect and health-check timeout in milliseconds
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Retries after an optimistic-lock conflict
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
}

impl Default for RedisOption {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: String::new(),
            min_idle_conns: default_min_idle_conns(),
            max_pool_size: default_max_pool_size(),
            dial_timeout_ms: default_dial_timeout_ms(),
            max_retry: default_max_retry(),
        }
    }
}

impl RedisOption {
    /// Create options for the given server, other fields defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the database index.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the pool sizing.
    pub fn with_pool_size(mut self, min_idle_conns: usize, max_pool_size: usize) -> Self {
        self.min_idle_conns = min_idle_conns;
        self.max_pool_size = max_pool_size;
        self
    }

    /// Set the connect timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the optimistic-lock retry budget.
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Connect and health-check timeout.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_min_idle_conns() -> usize {
    10
}

fn default_max_pool_size() -> usize {
    20
}

fn default_dial_timeout_ms() -> u64 {
    15_000
}

fn default_max_retry() -> u32 {
    1000
}
