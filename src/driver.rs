//! Driver selection.
//!
//! A [`Driver`] names a counter store; [`Limiter`] is the store built for it.
//! Construction applies a list of [`LimiterOption`]s in order and stops at the
//! first failure.
//!
//! # Example
//!
//! ```ignore
//! use fixed_quota::{Driver, Limiter, LimiterOption, RateLimiter};
//! use std::time::Duration;
//!
//! let driver: Driver = "memory".parse()?;
//! let limiter = Limiter::build(
//!     driver,
//!     60,
//!     [LimiterOption::Frequency(Duration::from_secs(60))],
//! )
//! .await?;
//! let token = limiter.acquire("10.0.0.1").await?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{RateLimitSettings, RedisOption};
use crate::error::{RateLimitError, Result};
use crate::limiter::RateLimiter;
use crate::quota::Quota;
use crate::token::Token;

#[cfg(feature = "memory")]
use crate::storage::MemoryRateLimiter;
#[cfg(feature = "redis")]
use crate::storage::RedisRateLimiter;

/// Window length of a freshly constructed limiter, until a frequency is set.
const INITIAL_FREQUENCY: Duration = Duration::from_secs(1);

/// Supported counter store drivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Driver {
    /// In-process store (`"local"` or `"memory"`).
    #[default]
    Local,
    /// Redis store (`"remote"` or `"redis"`).
    Remote,
}

impl Driver {
    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "memory",
            Self::Remote => "redis",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "memory" => Ok(Self::Local),
            "remote" | "redis" => Ok(Self::Remote),
            _ => Err(RateLimitError::UnsupportedDriver(s.to_string())),
        }
    }
}

impl TryFrom<String> for Driver {
    type Error = RateLimitError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A configuration step applied to a freshly built limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterOption {
    /// Set the window length.
    Frequency(Duration),
    /// Set the units per window.
    Limit(u64),
    /// Attach a Redis connection.
    Redis(RedisOption),
}

impl LimiterOption {
    /// Apply this option to a limiter.
    pub async fn apply<L: RateLimiter>(&self, limiter: &L) -> Result<()> {
        match self {
            Self::Frequency(frequency) => limiter.set_frequency(*frequency),
            Self::Limit(limit) => limiter.set_limit(*limit),
            Self::Redis(option) => limiter.configure(option).await,
        }
    }
}

/// A counter store selected by [`Driver`].
#[derive(Debug)]
pub enum Limiter {
    /// In-process store.
    #[cfg(feature = "memory")]
    Local(MemoryRateLimiter),
    /// Redis store.
    #[cfg(feature = "redis")]
    Remote(RedisRateLimiter),
}

impl Limiter {
    /// Construct the store for `driver` with `limit` units per one-second window.
    ///
    /// Fails with [`RateLimitError::UnsupportedDriver`] when the driver's
    /// feature is not compiled in.
    pub fn new(driver: Driver, limit: u64) -> Result<Self> {
        let quota = Quota::try_new(limit, INITIAL_FREQUENCY)?;
        match driver {
            #[cfg(feature = "memory")]
            Driver::Local => Ok(Self::Local(MemoryRateLimiter::new(quota))),
            #[cfg(feature = "redis")]
            Driver::Remote => Ok(Self::Remote(RedisRateLimiter::new(quota))),
            #[allow(unreachable_patterns)]
            other => Err(RateLimitError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Construct the store for `driver`, then apply `options` in order.
    ///
    /// The first failing option aborts construction with its error.
    pub async fn build<I>(driver: Driver, limit: u64, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = LimiterOption>,
    {
        let limiter = Self::new(driver, limit)?;
        for option in options {
            option.apply(&limiter).await?;
        }
        Ok(limiter)
    }

    /// Construct a limiter from loaded settings.
    pub async fn from_settings(settings: &RateLimitSettings) -> Result<Self> {
        let limiter = Self::build(
            settings.driver,
            settings.limit,
            [
                LimiterOption::Frequency(settings.frequency()),
                LimiterOption::Redis(settings.redis_option.clone()),
            ],
        )
        .await?;

        tracing::debug!(
            driver = %settings.driver,
            limit = settings.limit,
            frequency_ms = settings.frequency_ms,
            "limiter constructed"
        );
        Ok(limiter)
    }

    /// The driver this limiter was built for.
    pub fn driver(&self) -> Driver {
        match self {
            #[cfg(feature = "memory")]
            Self::Local(_) => Driver::Local,
            #[cfg(feature = "redis")]
            Self::Remote(_) => Driver::Remote,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $limiter:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "memory")]
            Limiter::Local($limiter) => $body,
            #[cfg(feature = "redis")]
            Limiter::Remote($limiter) => $body,
        }
    };
}

impl RateLimiter for Limiter {
    fn name(&self) -> &'static str {
        dispatch!(self, limiter => limiter.name())
    }

    fn quota(&self) -> Quota {
        dispatch!(self, limiter => limiter.quota())
    }

    fn set_frequency(&self, frequency: Duration) -> Result<()> {
        dispatch!(self, limiter => limiter.set_frequency(frequency))
    }

    fn set_limit(&self, limit: u64) -> Result<()> {
        dispatch!(self, limiter => limiter.set_limit(limit))
    }

    async fn configure(&self, option: &RedisOption) -> Result<()> {
        dispatch!(self, limiter => limiter.configure(option).await)
    }

    async fn acquire_n(&self, key: &str, n: u64) -> Result<Vec<Token>> {
        dispatch!(self, limiter => limiter.acquire_n(key, n).await)
    }
}
