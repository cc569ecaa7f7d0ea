use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::guard::CircuitSnapshot;

/// Request counters for one proxy.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Requests that ended in an error, including circuit rejections.
    pub failed_requests: u64,
    pub cache_hits: u64,
    /// Individual upstream invocations, retries and canaries included.
    pub upstream_calls: u64,
    /// Requests turned away by an open circuit.
    pub rejected_requests: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Everything a metrics endpoint would show for one proxy.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProxyStats {
    pub source_name: String,
    pub requests: RequestStats,
    pub cache: CacheStats,
    pub circuit: CircuitSnapshot,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RequestCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    upstream_calls: AtomicU64,
    rejected: AtomicU64,
    last_request_at: Mutex<Option<DateTime<Utc>>>,
}

impl RequestCounters {
    pub(crate) fn record_request(&self, at: DateTime<Utc>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.lock_last_request() = Some(at);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upstream_call(&self) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn lock_last_request(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_request_at.lock().unwrap_or_else(|poisoned| {
            warn!("Request stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub(crate) fn snapshot(&self) -> RequestStats {
        RequestStats {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            rejected_requests: self.rejected.load(Ordering::Relaxed),
            last_request_at: *self.lock_last_request(),
        }
    }
}
