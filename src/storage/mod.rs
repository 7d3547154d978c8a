//! Counter stores.
//!
//! A counter store holds, per key, the remaining quota and the expiry of the
//! current window, and implements [`RateLimiter`](crate::RateLimiter) on top of
//! it. Two stores ship with the crate:
//!
//! - [`MemoryRateLimiter`] (`memory` feature): single process, one coarse lock.
//! - [`RedisRateLimiter`] (`redis` feature): shared between processes through
//!   Redis, using optimistic transactions under contention.

#[cfg(feature = "memory")]
mod cache;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod window;

pub use window::WindowState;
pub(crate) use window::check_amount;

#[cfg(feature = "memory")]
pub use cache::{GcConfig, GcInterval};
#[cfg(feature = "memory")]
pub use memory::MemoryRateLimiter;

#[cfg(feature = "redis")]
pub use redis::RedisRateLimiter;

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
