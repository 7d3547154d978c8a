//! Remote counter store backed by Redis.
//!
//! Several processes may share one Redis, so every acquisition is an
//! optimistic transaction: `WATCH` the key, read the window, then commit the
//! new window with `MULTI`/`PSETEX`/`EXEC`. An aborted `EXEC` means another
//! client changed the key in between; the whole sequence is retried up to the
//! configured budget. Records live at least as long as their window.

use std::future::Future;
use std::time::Duration;

use deadpool_redis::{
    Connection, Manager, Pool, PoolError, Runtime, TimeoutType,
    redis::{self, AsyncCommands, IntoConnectionInfo, Value, cmd},
};
use parking_lot::RwLock;

use crate::config::RedisOption;
use crate::error::{ConfigError, ConnectionError, RateLimitError, Result, StorageError};
use crate::limiter::RateLimiter;
use crate::quota::Quota;
use crate::storage::{WindowState, check_amount, current_timestamp_ms};
use crate::token::Token;

/// Pool and retry budget installed by `configure`.
#[derive(Clone)]
struct Backend {
    pool: Pool,
    max_retry: u32,
}

/// A window read under `WATCH`, ready to be committed.
struct Pending {
    tokens: Vec<Token>,
    payload: String,
    ttl_ms: u64,
}

/// Outcome of one optimistic attempt.
enum Attempt {
    Committed(Vec<Token>),
    Conflict,
}

/// Runs between reading a window and committing it.
trait BeforeCommit: Sync {
    fn before_commit(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl BeforeCommit for () {
    async fn before_commit(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Redis counter store.
///
/// Must be configured with a [`RedisOption`] before the first acquisition.
///
/// # Example
///
/// ```ignore
/// use fixed_quota::{Quota, RateLimiter, RedisOption, RedisRateLimiter};
///
/// let limiter = RedisRateLimiter::new(Quota::per_minute(60));
/// limiter.configure(&RedisOption::new("127.0.0.1", 6379)).await?;
///
/// let tokens = limiter.acquire_n("10.0.0.1", 2).await?;
/// ```
pub struct RedisRateLimiter {
    quota: RwLock<Quota>,
    backend: RwLock<Option<Backend>>,
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter")
            .field("quota", &*self.quota.read())
            .field("configured", &self.backend.read().is_some())
            .finish()
    }
}

impl Default for RedisRateLimiter {
    fn default() -> Self {
        Self::new(Quota::default())
    }
}

impl RedisRateLimiter {
    /// Create an unconfigured Redis store.
    pub fn new(quota: Quota) -> Self {
        Self {
            quota: RwLock::new(quota),
            backend: RwLock::new(None),
        }
    }

    /// Whether a connection pool is attached.
    pub fn is_configured(&self) -> bool {
        self.backend.read().is_some()
    }

    fn backend(&self) -> Result<Backend> {
        self.backend
            .read()
            .clone()
            .ok_or_else(|| ConnectionError::NotConfigured.into())
    }

    async fn transact<H: BeforeCommit>(
        &self,
        backend: &Backend,
        quota: &Quota,
        key: &str,
        n: u64,
        hook: &H,
    ) -> Result<Vec<Token>> {
        let mut conn = backend.pool.get().await.map_err(pool_error)?;

        let attempts = backend.max_retry.saturating_add(1);
        for attempt in 1..=attempts {
            let outcome = async {
                let pending = read_window(&mut conn, quota, key, n).await?;
                hook.before_commit(key).await?;
                commit(&mut conn, key, pending).await
            }
            .await;

            match outcome {
                Ok(Attempt::Committed(tokens)) => return Ok(tokens),
                Ok(Attempt::Conflict) => {
                    tracing::trace!(key, attempt, "window modified concurrently, retrying");
                }
                Err(err) => {
                    // Leave no watch behind on a pooled connection.
                    let _: redis::RedisResult<()> = cmd("UNWATCH").query_async(&mut conn).await;
                    return Err(err);
                }
            }
        }

        Err(RateLimitError::ContentionExhausted { attempts })
    }
}

/// `WATCH` the key, then read and update its window.
async fn read_window(conn: &mut Connection, quota: &Quota, key: &str, n: u64) -> Result<Pending> {
    let _: () = cmd("WATCH")
        .arg(key)
        .query_async(&mut *conn)
        .await
        .map_err(operation_failed)?;

    let raw: Option<Vec<u8>> = conn.get(key).await.map_err(operation_failed)?;
    let now = current_timestamp_ms();
    let stored = raw.as_deref().and_then(WindowState::decode);
    let mut window = WindowState::current(stored, quota, now);

    let tokens = window.take(quota.limit(), n, now)?;

    let payload = match window.encode() {
        Ok(payload) => payload,
        Err(err) => {
            // Drop the stale record so the next call starts a fresh window.
            let _: () = conn.del(key).await.map_err(operation_failed)?;
            return Err(err);
        }
    };

    Ok(Pending {
        tokens,
        payload,
        ttl_ms: window.ttl(quota, now).as_millis() as u64,
    })
}

/// `MULTI`/`PSETEX`/`EXEC`; a nil reply means the watched key changed.
async fn commit(conn: &mut Connection, key: &str, pending: Pending) -> Result<Attempt> {
    let committed: Option<Value> = redis::pipe()
        .atomic()
        .pset_ex(key, pending.payload, pending.ttl_ms)
        .query_async(&mut *conn)
        .await
        .map_err(operation_failed)?;

    Ok(match committed {
        Some(_) => Attempt::Committed(pending.tokens),
        None => Attempt::Conflict,
    })
}

impl RateLimiter for RedisRateLimiter {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn quota(&self) -> Quota {
        *self.quota.read()
    }

    fn set_frequency(&self, frequency: Duration) -> Result<()> {
        let mut quota = self.quota.write();
        *quota = quota.with_frequency(frequency)?;
        Ok(())
    }

    fn set_limit(&self, limit: u64) -> Result<()> {
        let mut quota = self.quota.write();
        *quota = quota.with_limit(limit)?;
        Ok(())
    }

    async fn configure(&self, option: &RedisOption) -> Result<()> {
        let pool = create_pool(option)?;
        let dial_timeout = option.dial_timeout();

        let probe = async {
            let mut conn = pool.get().await.map_err(pool_error)?;
            let _: () = cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

            // Open the idle connections up front; they return to the pool on drop.
            let mut idle = vec![conn];
            while idle.len() < option.min_idle_conns.min(option.max_pool_size) {
                idle.push(pool.get().await.map_err(pool_error)?);
            }
            Ok::<_, RateLimitError>(idle.len())
        };

        let idle = tokio::time::timeout(dial_timeout, probe)
            .await
            .map_err(|_| ConnectionError::Timeout(dial_timeout))??;

        tracing::debug!(
            host = %option.host,
            port = option.port,
            db = option.db,
            idle,
            max_retry = option.max_retry,
            "redis counter store configured"
        );

        *self.backend.write() = Some(Backend {
            pool,
            max_retry: option.max_retry,
        });
        Ok(())
    }

    async fn acquire_n(&self, key: &str, n: u64) -> Result<Vec<Token>> {
        check_amount(n)?;
        let quota = self.quota();
        let backend = self.backend()?;

        // Bound the whole round trip, retries included, by one window.
        let frequency = quota.frequency();
        tokio::time::timeout(frequency, self.transact(&backend, &quota, key, n, &()))
            .await
            .map_err(|_| ConnectionError::Timeout(frequency))?
    }
}

fn create_pool(option: &RedisOption) -> Result<Pool> {
    if option.max_pool_size == 0 {
        return Err(ConfigError::InvalidStorage("max_pool_size must be greater than 0".into()).into());
    }

    let mut info = (option.host.as_str(), option.port)
        .into_connection_info()
        .map_err(|e| ConfigError::InvalidStorage(e.to_string()))?;
    info.redis.db = option.db;
    if !option.password.is_empty() {
        info.redis.password = Some(option.password.clone());
    }

    let manager = Manager::new(info).map_err(|e| ConfigError::InvalidStorage(e.to_string()))?;
    Pool::builder(manager)
        .max_size(option.max_pool_size)
        .create_timeout(Some(option.dial_timeout()))
        .wait_timeout(Some(option.dial_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()).into())
}

fn operation_failed(err: redis::RedisError) -> RateLimitError {
    StorageError::operation_failed(err.to_string()).into()
}

fn pool_error(err: PoolError) -> RateLimitError {
    match err {
        PoolError::Timeout(TimeoutType::Wait) => StorageError::PoolExhausted.into(),
        PoolError::Timeout(TimeoutType::Create) => {
            ConnectionError::ConnectionFailed("timed out opening a connection".into()).into()
        }
        other => ConnectionError::ConnectionFailed(other.to_string()).into(),
    }
}
