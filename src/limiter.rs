//! The rate limiter contract.
//!
//! Every counter store implements [`RateLimiter`]; callers depend only on this
//! trait (or on the [`Limiter`](crate::Limiter) enum built from a driver name).
//!
//! # Keys
//!
//! A key is the canonical string form of whatever identifies the caller (a
//! client IP, a user id, ...). Two keys share a quota bucket iff their strings
//! are equal, so convert with `to_string()` before calling in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisOption;
use crate::error::{Result, StorageError};
use crate::quota::Quota;
use crate::token::Token;

/// Fixed-window quota contract implemented by every counter store.
///
/// All methods take `&self`; implementations are thread-safe and may be
/// shared behind an `Arc`.
pub trait RateLimiter: Send + Sync + 'static {
    /// Store name (for logging).
    fn name(&self) -> &'static str;

    /// Quota applied to windows created from now on.
    fn quota(&self) -> Quota;

    /// Set the window length for future windows.
    fn set_frequency(&self, frequency: Duration) -> Result<()>;

    /// Set the units per window for future windows.
    ///
    /// A running window keeps its remaining units, capped at the new limit.
    /// Token numbers continue from `limit - remaining`, so raising the limit
    /// mid-window skips ahead: with limit 3, two grants, then `set_limit(10)`,
    /// the next token is number 10.
    fn set_limit(&self, limit: u64) -> Result<()>;

    /// Attach a remote connection.
    ///
    /// Stores without a remote backend accept and ignore it.
    fn configure(&self, option: &RedisOption) -> impl Future<Output = Result<()>> + Send;

    /// Reserve `n` units of `key`'s current window.
    ///
    /// Returns exactly `n` consecutively numbered tokens, or fails without
    /// granting anything.
    fn acquire_n(&self, key: &str, n: u64) -> impl Future<Output = Result<Vec<Token>>> + Send;

    /// Reserve a single unit of `key`'s current window.
    fn acquire(&self, key: &str) -> impl Future<Output = Result<Token>> + Send {
        async move {
            let mut tokens = self.acquire_n(key, 1).await?;
            tokens
                .pop()
                .ok_or_else(|| StorageError::operation_failed("no token issued").into())
        }
    }
}

impl<L: RateLimiter> RateLimiter for Arc<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn quota(&self) -> Quota {
        (**self).quota()
    }

    fn set_frequency(&self, frequency: Duration) -> Result<()> {
        (**self).set_frequency(frequency)
    }

    fn set_limit(&self, limit: u64) -> Result<()> {
        (**self).set_limit(limit)
    }

    async fn configure(&self, option: &RedisOption) -> Result<()> {
        (**self).configure(option).await
    }

    async fn acquire_n(&self, key: &str, n: u64) -> Result<Vec<Token>> {
        (**self).acquire_n(key, n).await
    }

    async fn acquire(&self, key: &str) -> Result<Token> {
        (**self).acquire(key).await
    }
}
