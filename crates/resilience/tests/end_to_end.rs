//! End-to-end tests of a proxy built from the full stack.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quotron_resilience::{
    CacheConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, HealthError,
    HealthKey, HealthRegistry, HealthReport, HealthStatus, HealthStore, InMemoryHealthStore,
    ManualClock, ResilienceError, ResilientProxy, RetryConfig, RetryPolicy, TtlCache,
    UpstreamSource, UserSignal,
};
use serde_json::{json, Value};

#[derive(Default)]
struct QuoteUpstream {
    down: AtomicBool,
    calls: AtomicU32,
}

#[async_trait]
impl UpstreamSource for QuoteUpstream {
    fn source_name(&self) -> &str {
        "yfinance_proxy"
    }

    fn source_detail(&self) -> &str {
        "Yahoo Finance"
    }

    fn canary_key(&self) -> &str {
        "AAPL"
    }

    async fn fetch(&self, key: &str) -> Result<Value, ResilienceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(ResilienceError::upstream("yfinance_proxy", "HTTP 503"));
        }
        Ok(json!({ "symbol": key, "price": 189.91 }))
    }
}

/// Store that is always down.
struct UnavailableStore;

#[async_trait]
impl HealthStore for UnavailableStore {
    async fn upsert(&self, _report: &HealthReport) -> Result<(), HealthError> {
        Err(HealthError::store_unavailable("disk I/O error"))
    }

    async fn get(&self, _key: &HealthKey) -> Result<Option<HealthReport>, HealthError> {
        Err(HealthError::store_unavailable("disk I/O error"))
    }

    async fn list(&self) -> Result<Vec<HealthReport>, HealthError> {
        Err(HealthError::store_unavailable("disk I/O error"))
    }
}

fn build_proxy(
    upstream: Arc<QuoteUpstream>,
    store: Arc<dyn HealthStore>,
    max_retries: u32,
) -> (ResilientProxy, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let shared: Arc<dyn Clock> = clock.clone();
    let proxy = ResilientProxy::new(
        upstream,
        TtlCache::with_clock(
            CacheConfig {
                default_ttl: Duration::from_secs(300),
            },
            shared.clone(),
        ),
        CircuitBreaker::with_clock(
            "yfinance_proxy",
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(600),
                max_half_open_trials: 3,
            },
            shared.clone(),
        ),
        RetryPolicy::new(RetryConfig {
            max_retries,
            ..Default::default()
        })
        .unwrap(),
        Arc::new(HealthRegistry::with_clock(store, shared.clone())),
        shared,
    );
    (proxy, clock)
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_serves_cache_until_ttl_then_fails_fast() {
    let upstream = Arc::new(QuoteUpstream::default());
    let (proxy, clock) = build_proxy(upstream.clone(), Arc::new(InMemoryHealthStore::new()), 0);

    let cached = proxy.get("AAPL").await.unwrap();
    upstream.down.store(true, Ordering::SeqCst);

    for _ in 0..5 {
        let err = proxy.get("MSFT").await.unwrap_err();
        assert_eq!(err.user_signal(), UserSignal::UpstreamFailure);
    }
    assert_eq!(proxy.breaker().state(), CircuitState::Open);
    let calls_when_opened = upstream.calls.load(Ordering::SeqCst);
    assert_eq!(calls_when_opened, 6);

    // Cache is consulted before the breaker.
    assert_eq!(proxy.get("AAPL").await.unwrap(), cached);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), calls_when_opened);

    clock.advance(Duration::from_secs(301));

    let err = proxy.get("AAPL").await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.user_signal(), UserSignal::Unavailable);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), calls_when_opened);

    let row = proxy.health().get(&proxy.health_key()).await.unwrap();
    assert_eq!(row.status, HealthStatus::Failed);
    assert_eq!(row.error_count, 5);
    assert!(row.last_success.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_timeout_closes_circuit() {
    let upstream = Arc::new(QuoteUpstream::default());
    let (proxy, clock) = build_proxy(upstream.clone(), Arc::new(InMemoryHealthStore::new()), 0);

    upstream.down.store(true, Ordering::SeqCst);
    for _ in 0..5 {
        proxy.get("MSFT").await.unwrap_err();
    }
    assert_eq!(proxy.breaker().state(), CircuitState::Open);

    upstream.down.store(false, Ordering::SeqCst);
    clock.advance(Duration::from_secs(600));

    proxy.get("MSFT").await.unwrap();
    assert_eq!(proxy.breaker().state(), CircuitState::Closed);

    let row = proxy.health().get(&proxy.health_key()).await.unwrap();
    assert_eq!(row.status, HealthStatus::Healthy);
    assert_eq!(row.error_count, 5);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhaust_before_counting_against_breaker() {
    let upstream = Arc::new(QuoteUpstream::default());
    let (proxy, _clock) = build_proxy(upstream.clone(), Arc::new(InMemoryHealthStore::new()), 3);
    upstream.down.store(true, Ordering::SeqCst);

    let started = tokio::time::Instant::now();
    let err = proxy.get("AAPL").await.unwrap_err();

    assert_eq!(err, ResilienceError::upstream("yfinance_proxy", "HTTP 503"));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 4);
    assert_eq!(proxy.breaker().failure_count(), 1);
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_health_store_outage_never_fails_requests() {
    let upstream = Arc::new(QuoteUpstream::default());
    let (proxy, _clock) = build_proxy(upstream.clone(), Arc::new(UnavailableStore), 0);

    let value = proxy.get("AAPL").await.unwrap();
    assert_eq!(value["symbol"], "AAPL");

    upstream.down.store(true, Ordering::SeqCst);
    let err = proxy.get("MSFT").await.unwrap_err();
    assert!(!err.is_circuit_open());

    // Readers get the last-known row instead of an error.
    let row = proxy.health().get(&proxy.health_key()).await.unwrap();
    assert_eq!(row.status, HealthStatus::Failed);
    assert_eq!(row.error_count, 1);
    assert_eq!(proxy.health().list().await.len(), 1);
}
