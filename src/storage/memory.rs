//! Local counter store.
//!
//! Windows live in an in-process expiring cache. A single lock guards the
//! quota settings and the whole read-decrement-write sequence of every key.

use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RedisOption;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::quota::Quota;
use crate::storage::cache::{ExpiringCache, GcConfig};
use crate::storage::{WindowState, check_amount, current_timestamp_ms};
use crate::token::Token;

/// In-process counter store.
///
/// Idle keys are evicted one window after their last acquisition, and never
/// before their current window expires.
///
/// # Example
///
/// ```ignore
/// use fixed_quota::{MemoryRateLimiter, Quota, RateLimiter};
///
/// let limiter = MemoryRateLimiter::new(Quota::per_second(3));
/// let token = limiter.acquire("10.0.0.1").await?;
/// assert_eq!(token.number(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryRateLimiter {
    quota: Mutex<Quota>,
    windows: ExpiringCache<WindowState>,
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new(Quota::default())
    }
}

impl MemoryRateLimiter {
    /// Create a local store with default GC configuration.
    pub fn new(quota: Quota) -> Self {
        Self::with_gc(quota, GcConfig::default())
    }

    /// Create a local store with custom GC configuration.
    pub fn with_gc(quota: Quota, gc_config: GcConfig) -> Self {
        Self {
            quota: Mutex::new(quota),
            windows: ExpiringCache::with_gc(gc_config),
        }
    }

    /// Number of keys currently cached, including ones awaiting eviction.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Check if no key is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict idle keys now, returning how many were removed.
    pub fn run_gc(&self) -> usize {
        self.windows.run_gc()
    }

    /// Drop every window.
    pub fn clear(&self) {
        self.windows.clear();
    }

    fn take(&self, key: &str, n: u64) -> Result<Vec<Token>> {
        let quota = self.quota.lock();
        let now = current_timestamp_ms();

        let mut window = WindowState::current(self.windows.get(key, now), &quota, now);
        let result = window.take(quota.limit(), n, now);
        self.windows.insert(key, window, window.ttl(&quota, now));

        result
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn quota(&self) -> Quota {
        *self.quota.lock()
    }

    fn set_frequency(&self, frequency: Duration) -> Result<()> {
        let mut quota = self.quota.lock();
        *quota = quota.with_frequency(frequency)?;
        Ok(())
    }

    fn set_limit(&self, limit: u64) -> Result<()> {
        let mut quota = self.quota.lock();
        *quota = quota.with_limit(limit)?;
        Ok(())
    }

    async fn configure(&self, _option: &RedisOption) -> Result<()> {
        Ok(())
    }

    async fn acquire_n(&self, key: &str, n: u64) -> Result<Vec<Token>> {
        check_amount(n)?;
        self.take(key, n)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::RateLimitError;

    fn limiter(limit: u64, frequency: Duration) -> MemoryRateLimiter {
        MemoryRateLimiter::with_gc(Quota::new(limit, frequency), GcConfig::manual())
    }

    #[tokio::test]
    async fn test_sequence_then_exhausted() {
        let limiter = limiter(3, Duration::from_secs(1));

        for expected in 1..=3 {
            let token = limiter.acquire("10.0.0.1").await.unwrap();
            assert_eq!(token.number(), expected);
        }

        let err = limiter.acquire("10.0.0.1").await.unwrap_err();
        assert!(err.is_quota_exhausted());
    }

    #[tokio::test]
    async fn test_window_resets_after_frequency() {
        let limiter = limiter(3, Duration::from_millis(50));

        let first = limiter.acquire("k").await.unwrap();
        limiter.acquire_n("k", 2).await.unwrap();
        assert!(limiter.acquire("k").await.is_err());

        tokio::time::sleep(first.time_until_expiry() + Duration::from_millis(10)).await;

        let token = limiter.acquire("k").await.unwrap();
        assert_eq!(token.number(), 1);
        assert!(token.expires_at_ms() > first.expires_at_ms());
    }

    #[tokio::test]
    async fn test_acquire_n_no_partial_grant() {
        let limiter = limiter(5, Duration::from_secs(1));

        let tokens = limiter.acquire_n("k", 3).await.unwrap();
        assert_eq!(tokens.len(), 3);

        let err = limiter.acquire_n("k", 3).await.unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::QuotaExhausted {
                requested: 3,
                remaining: 2,
                limit: 5,
                ..
            }
        ));

        let tokens = limiter.acquire_n("k", 2).await.unwrap();
        assert_eq!(tokens[0].number(), 4);
        assert_eq!(tokens[1].number(), 5);
    }

    #[tokio::test]
    async fn test_zero_units_rejected() {
        let limiter = limiter(5, Duration::from_secs(1));
        assert!(matches!(
            limiter.acquire_n("k", 0).await,
            Err(RateLimitError::InvalidRequest(_))
        ));
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_setters_apply_to_future_windows() {
        let limiter = limiter(2, Duration::from_millis(40));
        let first = limiter.acquire("k").await.unwrap();

        limiter.set_limit(5).unwrap();
        limiter.set_frequency(Duration::from_secs(10)).unwrap();
        assert_eq!(limiter.quota(), Quota::new(5, Duration::from_secs(10)));

        // The running window keeps its expiry.
        let token = limiter.acquire("k").await.unwrap();
        assert_eq!(token.expires_at_ms(), first.expires_at_ms());

        tokio::time::sleep(first.time_until_expiry() + Duration::from_millis(10)).await;
        let tokens = limiter.acquire_n("k", 5).await.unwrap();
        assert_eq!(tokens.last().unwrap().number(), 5);
        assert!(tokens[0].time_until_expiry() > Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_lowered_frequency_keeps_live_window() {
        let limiter = limiter(1, Duration::from_secs(60));
        let first = limiter.acquire("k").await.unwrap();
        assert_eq!(first.number(), 1);

        limiter.set_frequency(Duration::from_millis(10)).unwrap();
        assert!(limiter.acquire("k").await.unwrap_err().is_quota_exhausted());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(limiter.run_gc(), 0);

        let err = limiter.acquire("k").await.unwrap_err();
        match err {
            RateLimitError::QuotaExhausted { retry_after, .. } => {
                assert!(retry_after.unwrap() > Duration::from_secs(50));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_setters() {
        let limiter = limiter(2, Duration::from_secs(1));
        assert!(limiter.set_limit(0).is_err());
        assert!(limiter.set_frequency(Duration::ZERO).is_err());
        assert_eq!(limiter.quota(), Quota::new(2, Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_configure_is_noop() {
        let limiter = limiter(2, Duration::from_secs(1));
        limiter.configure(&RedisOption::default()).await.unwrap();
        assert_eq!(limiter.acquire("k").await.unwrap().number(), 1);
    }

    #[tokio::test]
    async fn test_idle_keys_evicted() {
        let limiter = limiter(2, Duration::from_millis(10));
        limiter.acquire("a").await.unwrap();
        limiter.acquire("b").await.unwrap();
        assert_eq!(limiter.len(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(limiter.run_gc(), 2);
        assert!(limiter.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grants_are_unique() {
        let limiter = Arc::new(limiter(50, Duration::from_secs(10)));

        let mut handles = Vec::new();
        for _ in 0..80 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire("shared").await }));
        }

        let mut numbers = Vec::new();
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(token) => numbers.push(token.number()),
                Err(err) => {
                    assert!(err.is_quota_exhausted());
                    exhausted += 1;
                }
            }
        }

        numbers.sort_unstable();
        assert_eq!(numbers, (1..=50).collect::<Vec<_>>());
        assert_eq!(exhausted, 30);
    }
}
