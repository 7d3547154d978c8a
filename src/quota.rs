//! Quota configuration for fixed-window limiting.
//!
//! A `Quota` defines how many operations a key may perform per window and how
//! long a window lasts. Changing a limiter's quota only affects windows created
//! afterwards.
//!
//! # Examples
//!
//! ```ignore
//! use fixed_quota::Quota;
//! use std::time::Duration;
//!
//! // 100 requests per minute
//! let quota = Quota::per_minute(100);
//!
//! // Custom: 50 requests per 30 seconds
//! let quota = Quota::new(50, Duration::from_secs(30));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Fixed-window quota configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Maximum number of operations per window.
    limit: u64,

    /// Window length.
    frequency: Duration,
}

impl Quota {
    /// Create a new quota with the given limit and window length.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0 or `frequency` is zero duration.
    pub fn new(limit: u64, frequency: Duration) -> Self {
        assert!(limit > 0, "limit must be greater than 0");
        assert!(!frequency.is_zero(), "frequency must be non-zero");

        Self { limit, frequency }
    }

    /// Create a quota allowing `n` operations per second.
    pub fn per_second(n: u64) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    /// Create a quota allowing `n` operations per minute.
    pub fn per_minute(n: u64) -> Self {
        Self::new(n, Duration::from_secs(60))
    }

    /// Create a quota allowing `n` operations per hour.
    pub fn per_hour(n: u64) -> Self {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Try to create a new quota, returning an error if invalid.
    pub fn try_new(limit: u64, frequency: Duration) -> Result<Self> {
        validate_limit(limit)?;
        validate_frequency(frequency)?;
        Ok(Self { limit, frequency })
    }

    /// Replace the limit, keeping the window length.
    pub fn with_limit(self, limit: u64) -> Result<Self> {
        validate_limit(limit)?;
        Ok(Self { limit, ..self })
    }

    /// Replace the window length, keeping the limit.
    pub fn with_frequency(self, frequency: Duration) -> Result<Self> {
        validate_frequency(frequency)?;
        Ok(Self { frequency, ..self })
    }

    /// Get the maximum operations allowed per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Get the window length.
    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Window length in whole milliseconds, never less than 1.
    pub fn frequency_ms(&self) -> u64 {
        (self.frequency.as_millis() as u64).max(1)
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

fn validate_limit(limit: u64) -> Result<()> {
    if limit == 0 {
        return Err(ConfigError::InvalidQuota("limit must be greater than 0".into()).into());
    }
    Ok(())
}

fn validate_frequency(frequency: Duration) -> Result<()> {
    if frequency.is_zero() {
        return Err(ConfigError::InvalidQuota("frequency must be non-zero".into()).into());
    }
    Ok(())
}

/// Builder for creating quotas with validation.
#[derive(Debug, Default)]
pub struct QuotaBuilder {
    limit: Option<u64>,
    frequency: Option<Duration>,
}

impl QuotaBuilder {
    /// Create a new quota builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit per window.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set the window length.
    pub fn frequency(mut self, duration: Duration) -> Self {
        self.frequency = Some(duration);
        self
    }

    /// Build the quota, returning an error if invalid.
    pub fn build(self) -> Result<Quota> {
        let limit = self
            .limit
            .ok_or_else(|| ConfigError::MissingRequired("limit".into()))?;
        let frequency = self
            .frequency
            .ok_or_else(|| ConfigError::MissingRequired("frequency".into()))?;

        Quota::try_new(limit, frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_per_second() {
        let quota = Quota::per_second(10);
        assert_eq!(quota.limit(), 10);
        assert_eq!(quota.frequency(), Duration::from_secs(1));
        assert_eq!(quota.frequency_ms(), 1000);
    }

    #[test]
    fn test_quota_default() {
        let quota = Quota::default();
        assert_eq!(quota.limit(), 60);
        assert_eq!(quota.frequency(), Duration::from_secs(60));
    }

    #[test]
    fn test_quota_with_setters() {
        let quota = Quota::per_second(10)
            .with_limit(3)
            .unwrap()
            .with_frequency(Duration::from_millis(250))
            .unwrap();
        assert_eq!(quota.limit(), 3);
        assert_eq!(quota.frequency(), Duration::from_millis(250));

        assert!(quota.with_limit(0).is_err());
        assert!(quota.with_frequency(Duration::ZERO).is_err());
    }

    #[test]
    fn test_quota_sub_millisecond_frequency() {
        let quota = Quota::new(1, Duration::from_micros(10));
        assert_eq!(quota.frequency_ms(), 1);
    }

    #[test]
    fn test_quota_builder_missing_fields() {
        let result = QuotaBuilder::new().limit(100).build();
        assert!(result.is_err());

        let result = QuotaBuilder::new()
            .frequency(Duration::from_secs(60))
            .build();
        assert!(result.is_err());
    }

    #[test]
    #[should_panic]
    fn test_quota_zero_limit_panics() {
        Quota::new(0, Duration::from_secs(60));
    }

    #[test]
    #[should_panic]
    fn test_quota_zero_frequency_panics() {
        Quota::new(100, Duration::ZERO);
    }
}
