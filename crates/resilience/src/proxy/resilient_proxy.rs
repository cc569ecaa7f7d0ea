use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::Value;

use super::stats::{ProxyStats, RequestCounters};
use super::upstream::UpstreamSource;
use crate::cache::{CacheConfig, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::config::ResilienceConfig;
use crate::errors::ResilienceError;
use crate::guard::{CircuitBreaker, RetryPolicy};
use crate::health::{HealthKey, HealthRegistry, HealthUpdate};

/// One upstream wrapped in cache, circuit breaker and retry.
///
/// Request path: cache lookup, then on a miss
/// `breaker.call(retry.run(upstream.fetch))`, then cache fill and a health
/// report. Cache hits never reach the breaker and are not reported.
pub struct ResilientProxy {
    upstream: Arc<dyn UpstreamSource>,
    cache: TtlCache<Value>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    health: Arc<HealthRegistry>,
    clock: Arc<dyn Clock>,
    counters: RequestCounters,
    started_at: Instant,
}

impl ResilientProxy {
    pub fn new(
        upstream: Arc<dyn UpstreamSource>,
        cache: TtlCache<Value>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        health: Arc<HealthRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            upstream,
            cache,
            breaker,
            retry,
            health,
            clock,
            counters: RequestCounters::default(),
            started_at,
        }
    }

    /// Build the whole stack for `upstream` from one configuration.
    ///
    /// The upstream's own TTL, when it has one, replaces the configured
    /// cache default.
    pub fn from_config(
        upstream: Arc<dyn UpstreamSource>,
        config: &ResilienceConfig,
        health: Arc<HealthRegistry>,
    ) -> Result<Self, ResilienceError> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache_config = CacheConfig {
            default_ttl: upstream.default_ttl().unwrap_or(config.cache.default_ttl),
        };
        cache_config.validate()?;

        let cache = TtlCache::with_clock(cache_config, clock.clone());
        let breaker = CircuitBreaker::with_clock(
            upstream.source_name(),
            config.circuit_breaker.clone(),
            clock.clone(),
        );
        let retry = RetryPolicy::new(config.retry.clone())?;

        Ok(Self::new(upstream, cache, breaker, retry, health, clock))
    }

    pub fn source_name(&self) -> &str {
        self.upstream.source_name()
    }

    pub fn source_detail(&self) -> &str {
        self.upstream.source_detail()
    }

    pub fn canary_key(&self) -> &str {
        self.upstream.canary_key()
    }

    pub fn health_key(&self) -> HealthKey {
        HealthKey::new(self.upstream.source_type(), self.upstream.source_name())
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", self.upstream.source_name(), key)
    }

    /// Serve `key` using the upstream's default TTL.
    pub async fn get(&self, key: &str) -> Result<Value, ResilienceError> {
        self.get_with_ttl(key, self.upstream.default_ttl()).await
    }

    /// Serve `key`, caching a fresh answer for `ttl` (`None` = cache default).
    ///
    /// A circuit rejection comes back as [`ResilienceError::CircuitOpen`];
    /// an exhausted retry sequence comes back as the upstream's last error.
    pub async fn get_with_ttl(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<Value, ResilienceError> {
        self.counters.record_request(self.clock.utc_now());

        let cache_key = self.cache_key(key);
        if let Some(value) = self.cache.get(&cache_key) {
            debug!("Proxy '{}': cache hit for '{}'", self.source_name(), key);
            self.counters.record_cache_hit();
            return Ok(value);
        }

        let started = self.clock.now();
        match self.guarded_fetch(key).await {
            Ok(value) => {
                let latency = self.clock.now().saturating_duration_since(started);
                self.cache.set(cache_key, value.clone(), ttl);
                self.counters.record_success();
                self.record_health(
                    HealthUpdate::healthy(self.health_key(), millis(latency))
                        .with_detail(self.source_detail()),
                )
                .await;
                Ok(value)
            }
            Err(e) if e.is_circuit_open() => {
                debug!("Proxy '{}': rejected '{}': {}", self.source_name(), key, e);
                self.counters.record_rejection();
                Err(e)
            }
            Err(e) => {
                warn!("Proxy '{}': request for '{}' failed: {}", self.source_name(), key, e);
                self.counters.record_failure();
                self.record_health(
                    HealthUpdate::failed(self.health_key(), e.to_string())
                        .with_detail(self.source_detail())
                        .with_metadata("circuit_state", self.breaker.state()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Run the canary request through breaker and retry.
    ///
    /// Always reaches for the upstream (a cached canary would prove
    /// nothing) and refreshes the canary's cache entry on success. Does not
    /// count as a user request and does not write health; the caller
    /// decides what to report. Returns the observed latency.
    pub async fn probe(&self) -> Result<Duration, ResilienceError> {
        let key = self.canary_key();
        let started = self.clock.now();
        let value = self.guarded_fetch(key).await?;
        let latency = self.clock.now().saturating_duration_since(started);

        self.cache
            .set(self.cache_key(key), value, self.upstream.default_ttl());
        Ok(latency)
    }

    async fn guarded_fetch(&self, key: &str) -> Result<Value, ResilienceError> {
        self.breaker
            .call(|| {
                self.retry.run(|| {
                    self.counters.record_upstream_call();
                    self.upstream.fetch(key)
                })
            })
            .await
    }

    async fn record_health(&self, update: HealthUpdate) {
        if let Err(e) = self.health.report(update).await {
            warn!(
                "Proxy '{}': failed to record health: {}",
                self.source_name(),
                e
            );
        }
    }

    /// Drop every cached response for this upstream.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Proxy '{}': cache cleared", self.source_name());
    }

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            source_name: self.source_name().to_string(),
            requests: self.counters.snapshot(),
            cache: self.cache.stats(),
            circuit: self.breaker.snapshot(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
