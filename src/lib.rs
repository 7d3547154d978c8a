//! Fixed-window per-key request quotas.
//!
//! `fixed_quota` lets a caller identified by a key (e.g. a client IP) perform at
//! most `limit` operations per `frequency` window. Once a window is exhausted,
//! further attempts are rejected until it rolls over.
//!
//! - **One contract**: [`RateLimiter`] with `acquire`, `acquire_n`, `set_limit`,
//!   `set_frequency` and `configure`
//! - **Two counter stores**: in-process ([`MemoryRateLimiter`]) and Redis
//!   ([`RedisRateLimiter`]) with optimistic transactions
//! - **Driver selection**: [`Driver`] names a store, [`Limiter`] builds it
//! - **Settings**: YAML file plus environment, see [`config`]
//!
//! # Quick Start
//!
//! ```ignore
//! use fixed_quota::{MemoryRateLimiter, Quota, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = MemoryRateLimiter::new(Quota::per_second(3));
//!
//!     match limiter.acquire("10.0.0.1").await {
//!         Ok(token) => println!("request #{} in this window", token.number()),
//!         Err(err) if err.is_quota_exhausted() => println!("too many requests"),
//!         Err(err) => println!("limiter failure: {err}"),
//!     }
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process counter store
//! - `redis` (default): Redis counter store
//!
//! At least one store feature must be enabled.

#[cfg(not(any(feature = "memory", feature = "redis")))]
compile_error!("enable at least one counter store feature: `memory` or `redis`");

pub mod config;
pub mod driver;
pub mod error;
pub mod limiter;
pub mod quota;
pub mod storage;
pub mod telemetry;
pub mod token;

// Re-export main types
pub use config::{LogFormat, LoggerSettings, RateLimitSettings, RedisOption, Settings};
pub use driver::{Driver, Limiter, LimiterOption};
pub use error::{ConfigError, ConnectionError, RateLimitError, Result, StorageError};
pub use limiter::RateLimiter;
pub use quota::{Quota, QuotaBuilder};
pub use storage::WindowState;
pub use token::Token;

// Re-export counter stores
#[cfg(feature = "memory")]
pub use storage::{GcConfig, GcInterval, MemoryRateLimiter};

#[cfg(feature = "redis")]
pub use storage::RedisRateLimiter;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::driver::{Driver, Limiter, LimiterOption};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::limiter::RateLimiter;
    pub use crate::quota::Quota;
    pub use crate::token::Token;

    #[cfg(feature = "memory")]
    pub use crate::storage::{GcConfig, MemoryRateLimiter};

    #[cfg(feature = "redis")]
    pub use crate::storage::RedisRateLimiter;
}
