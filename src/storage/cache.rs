//! In-memory expiring cache with automatic garbage collection.
//!
//! Entries carry their own eviction time. Reads never return an evicted
//! entry, and a configurable sweep removes them so idle keys do not
//! accumulate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::storage::current_timestamp_ms;

/// Garbage collection interval configuration.
#[derive(Debug, Clone)]
pub enum GcInterval {
    /// Sweep every N writes.
    Requests(u64),
    /// Sweep at fixed time intervals on a background task.
    Duration(Duration),
    /// Disable automatic GC.
    Manual,
}

impl Default for GcInterval {
    fn default() -> Self {
        Self::Requests(10000)
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone, Default)]
pub struct GcConfig {
    /// When to trigger GC.
    pub interval: GcInterval,
}

impl GcConfig {
    /// Create config with request-based GC.
    pub fn on_requests(count: u64) -> Self {
        Self {
            interval: GcInterval::Requests(count),
        }
    }

    /// Create config with time-based GC.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_duration(interval: Duration) -> Self {
        Self {
            interval: GcInterval::Duration(interval),
        }
    }

    /// Create config with manual GC only.
    pub fn manual() -> Self {
        Self {
            interval: GcInterval::Manual,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    evict_at: u64,
}

/// Concurrent map whose entries expire after a per-write TTL.
pub(crate) struct ExpiringCache<V> {
    data: Arc<DashMap<String, CachedEntry<V>>>,
    gc_config: GcConfig,
    write_count: AtomicU64,
    gc_lock: Mutex<()>,
    shutdown: Arc<Notify>,
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.data.len())
            .field("gc_config", &self.gc_config)
            .finish()
    }
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn with_gc(gc_config: GcConfig) -> Self {
        let cache = Self {
            data: Arc::new(DashMap::new()),
            gc_config: gc_config.clone(),
            write_count: AtomicU64::new(0),
            gc_lock: Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
        };

        if let GcInterval::Duration(interval) = gc_config.interval {
            cache.start_gc_task(interval);
        }

        cache
    }

    fn start_gc_task(&self, interval: Duration) {
        let data = Arc::clone(&self.data);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let evicted = sweep(&data);
                        tracing::trace!(evicted, "expiring cache sweep");
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });
    }

    /// Get a live entry.
    pub(crate) fn get(&self, key: &str, now: u64) -> Option<V> {
        let cached = self.data.get(key)?;
        if cached.evict_at > now {
            return Some(cached.value.clone());
        }
        drop(cached);
        self.data.remove_if(key, |_, cached| cached.evict_at <= now);
        None
    }

    /// Store an entry, resetting its TTL.
    pub(crate) fn insert(&self, key: &str, value: V, ttl: Duration) {
        self.maybe_run_gc();

        let evict_at = current_timestamp_ms().saturating_add(ttl.as_millis() as u64);
        self.data
            .insert(key.to_string(), CachedEntry { value, evict_at });
    }

    /// Sweep evicted entries now, returning how many were removed.
    pub(crate) fn run_gc(&self) -> usize {
        sweep(&self.data)
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn clear(&self) {
        self.data.clear();
    }

    fn maybe_run_gc(&self) {
        if let GcInterval::Requests(threshold) = self.gc_config.interval {
            let count = self.write_count.fetch_add(1, Ordering::Relaxed);
            if threshold > 0 && count % threshold == 0 && count > 0 {
                if let Some(_guard) = self.gc_lock.try_lock() {
                    sweep(&self.data);
                }
            }
        }
    }
}

impl<V> Drop for ExpiringCache<V> {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

fn sweep<V>(data: &DashMap<String, CachedEntry<V>>) -> usize {
    let now = current_timestamp_ms();
    let before = data.len();
    data.retain(|_, cached| cached.evict_at > now);
    before.saturating_sub(data.len())
}
