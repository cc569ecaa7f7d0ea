//! TTL cache with per-key locking.
//!
//! Entries live in a sharded concurrent map. Every operation touches only
//! its own key's slot for a bounded amount of in-memory work, so callers
//! working on different keys do not serialize behind one another. Nothing
//! in here ever awaits or performs I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

use super::{CacheConfig, CacheStats};
use crate::clock::{Clock, SystemClock};

/// A cached value and the instant it stops being valid.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    /// `None` when the TTL reaches past what an `Instant` can represent.
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// An entry is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Thread-safe cache mapping string keys to values with individual TTLs.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache using the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: config.default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// The TTL used when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live value.
    ///
    /// Returns `None` on a miss. An expired entry is removed on the way out
    /// and counted as both an eviction and a miss; it is never returned.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        {
            let Some(entry) = self.entries.get(key) else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };

            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            // Read guard must be released before taking the write side below.
        }

        // Only evict if the slot still holds an expired entry; a concurrent
        // `set` may have refreshed it in between.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Cache: evicted expired entry '{}'", key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// `ttl` of `None` uses the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = self.clock.now().checked_add(ttl);

        self.entries
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Remove `key` if present.
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove every entry. Counters other than `entries` are kept.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("Cache: cleared");
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.entries.len() as u64,
            self.evictions.load(Ordering::Relaxed),
        )
    }
}
