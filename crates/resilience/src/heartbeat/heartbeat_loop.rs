use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::HeartbeatConfig;
use crate::health::HealthUpdate;
use crate::proxy::{millis, ResilientProxy};

/// Local verdict of the heartbeat, independent of the stored health row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatState {
    #[default]
    Ok,
    /// Failing, but fewer than `failed_after` times in a row.
    Degraded,
    Failed,
}

/// What the loop last observed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub state: HeartbeatState,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub is_healthy: bool,
}

impl HeartbeatStatus {
    fn initial() -> Self {
        Self {
            is_healthy: true,
            ..Default::default()
        }
    }
}

/// Periodic canary check for one proxy.
///
/// Each tick probes the upstream through the proxy's breaker and retry
/// stack and writes the outcome to the proxy's health registry. A failed
/// tick is recorded like any other; the loop keeps going.
pub struct HeartbeatLoop {
    proxy: Arc<ResilientProxy>,
    config: HeartbeatConfig,
    status: Mutex<HeartbeatStatus>,
}

impl HeartbeatLoop {
    pub fn new(proxy: Arc<ResilientProxy>, config: HeartbeatConfig) -> Self {
        Self {
            proxy,
            config,
            status: Mutex::new(HeartbeatStatus::initial()),
        }
    }

    pub fn source_name(&self) -> &str {
        self.proxy.source_name()
    }

    fn lock_status(&self) -> MutexGuard<'_, HeartbeatStatus> {
        self.status.lock().unwrap_or_else(|poisoned| {
            warn!(
                "Heartbeat status mutex for '{}' was poisoned, recovering",
                self.proxy.source_name()
            );
            poisoned.into_inner()
        })
    }

    /// The status after the most recent tick.
    pub fn status(&self) -> HeartbeatStatus {
        self.lock_status().clone()
    }

    /// Run one canary check and record it.
    pub async fn tick(&self) -> HeartbeatStatus {
        let outcome = self.proxy.probe().await;
        let now = self.proxy.clock().utc_now();
        let uptime_secs = self.proxy.uptime().as_secs();
        let circuit_state = self.proxy.breaker().state();

        let (status, update) = {
            let mut status = self.lock_status();
            status.last_check = Some(now);

            let update = match &outcome {
                Ok(latency) => {
                    if status.consecutive_failures > 0 {
                        info!(
                            "Heartbeat '{}': recovered after {} failures",
                            self.source_name(),
                            status.consecutive_failures
                        );
                    }
                    status.consecutive_failures = 0;
                    status.state = HeartbeatState::Ok;

                    HealthUpdate::healthy(self.proxy.health_key(), millis(*latency))
                        .with_metadata("cache_stats", self.proxy.cache().stats())
                        .with_metadata("uptime_secs", uptime_secs)
                        .with_metadata("circuit_state", circuit_state)
                }
                Err(e) => {
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    status.state = if status.consecutive_failures >= self.config.failed_after {
                        HeartbeatState::Failed
                    } else {
                        HeartbeatState::Degraded
                    };
                    warn!(
                        "Heartbeat '{}': canary failed ({} in a row): {}",
                        self.source_name(),
                        status.consecutive_failures,
                        e
                    );

                    HealthUpdate::failed(self.proxy.health_key(), e.to_string())
                        .with_metadata("consecutive_failures", status.consecutive_failures)
                        .with_metadata("uptime_secs", uptime_secs)
                        .with_metadata("circuit_state", circuit_state)
                }
            };
            status.is_healthy = status.state == HeartbeatState::Ok;

            (status.clone(), update.with_detail(self.proxy.source_detail()))
        };

        if let Err(e) = self.proxy.health().report(update).await {
            warn!(
                "Heartbeat '{}': failed to record health: {}",
                self.source_name(),
                e
            );
        }

        debug!(
            "Heartbeat '{}': state {:?}",
            self.source_name(),
            status.state
        );
        status
    }

    /// Start ticking on a background task until `token` is cancelled.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// pushes the schedule back rather than bunching up missed ticks.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Heartbeat '{}' started ({}s interval)",
                self.source_name(),
                self.config.interval.as_secs()
            );

            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = self.tick() => {}
                }
            }

            info!("Heartbeat '{}' stopped", self.source_name());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, TtlCache};
    use crate::clock::{Clock, ManualClock};
    use crate::errors::ResilienceError;
    use crate::guard::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
    use crate::health::{HealthRegistry, HealthStatus, InMemoryHealthStore};
    use crate::proxy::UpstreamSource;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct IndicatorSource {
        down: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl UpstreamSource for IndicatorSource {
        fn source_name(&self) -> &str {
            "economic_factors_proxy"
        }

        fn canary_key(&self) -> &str {
            "GDP"
        }

        async fn fetch(&self, key: &str) -> Result<Value, ResilienceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(ResilienceError::upstream(
                    "economic_factors_proxy",
                    "HTTP 500",
                ));
            }
            Ok(json!({ "indicator": key, "value": 27.36 }))
        }
    }

    fn heartbeat(source: Arc<IndicatorSource>, failure_threshold: u32) -> HeartbeatLoop {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let health = Arc::new(HealthRegistry::with_clock(
            Arc::new(InMemoryHealthStore::new()),
            clock.clone(),
        ));
        let proxy = ResilientProxy::new(
            source,
            TtlCache::with_clock(CacheConfig::default(), clock.clone()),
            CircuitBreaker::with_clock(
                "economic_factors_proxy",
                CircuitBreakerConfig {
                    failure_threshold,
                    ..Default::default()
                },
                clock.clone(),
            ),
            RetryPolicy::new(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .unwrap(),
            health,
            clock,
        );
        HeartbeatLoop::new(
            Arc::new(proxy),
            HeartbeatConfig {
                interval: Duration::from_secs(60),
                failed_after: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_successful_tick_reports_healthy() {
        let heartbeat = heartbeat(Arc::new(IndicatorSource::default()), 5);

        let status = heartbeat.tick().await;

        assert_eq!(status.state, HeartbeatState::Ok);
        assert!(status.is_healthy);
        assert!(status.last_check.is_some());

        let row = heartbeat
            .proxy
            .health()
            .get(&heartbeat.proxy.health_key())
            .await
            .unwrap();
        assert_eq!(row.status, HealthStatus::Healthy);
        assert_eq!(row.source_name, "economic_factors_proxy");
        assert_eq!(row.source_type, "api-scraper");
        assert!(row.metadata.contains_key("cache_stats"));
        assert_eq!(row.metadata["circuit_state"], "CLOSED");
    }

    #[tokio::test]
    async fn test_failure_streak_degrades_then_fails() {
        let source = Arc::new(IndicatorSource::default());
        source.down.store(true, Ordering::SeqCst);
        let heartbeat = heartbeat(source.clone(), 10);

        assert_eq!(heartbeat.tick().await.state, HeartbeatState::Degraded);
        assert_eq!(heartbeat.tick().await.state, HeartbeatState::Degraded);
        let status = heartbeat.tick().await;
        assert_eq!(status.state, HeartbeatState::Failed);
        assert_eq!(status.consecutive_failures, 3);
        assert!(!status.is_healthy);

        let row = heartbeat
            .proxy
            .health()
            .get(&heartbeat.proxy.health_key())
            .await
            .unwrap();
        assert_eq!(row.status, HealthStatus::Failed);
        assert_eq!(row.error_count, 3);
        assert_eq!(row.metadata["consecutive_failures"], 3);
        assert_eq!(row.error_message.as_deref(), Some("Upstream error: economic_factors_proxy - HTTP 500"));

        source.down.store(false, Ordering::SeqCst);
        let status = heartbeat.tick().await;
        assert_eq!(status.state, HeartbeatState::Ok);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_is_reported_as_failure() {
        let source = Arc::new(IndicatorSource::default());
        source.down.store(true, Ordering::SeqCst);
        let heartbeat = heartbeat(source.clone(), 1);

        heartbeat.tick().await;
        let status = heartbeat.tick().await;

        // Second tick was rejected by the breaker without reaching upstream.
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.consecutive_failures, 2);
        let row = heartbeat
            .proxy
            .health()
            .get(&heartbeat.proxy.health_key())
            .await
            .unwrap();
        assert_eq!(row.metadata["circuit_state"], "OPEN");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_ticks_until_cancelled() {
        let source = Arc::new(IndicatorSource::default());
        let heartbeat = Arc::new(heartbeat(source.clone(), 5));
        let token = CancellationToken::new();

        let handle = heartbeat.clone().spawn(token.clone());

        // Ticks at 0s, 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        token.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(heartbeat.status().is_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_running_through_failures() {
        let source = Arc::new(IndicatorSource::default());
        source.down.store(true, Ordering::SeqCst);
        let heartbeat = Arc::new(heartbeat(source.clone(), 100));
        let token = CancellationToken::new();

        let handle = heartbeat.clone().spawn(token.clone());
        tokio::time::sleep(Duration::from_secs(270)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 5);
        assert_eq!(heartbeat.status().state, HeartbeatState::Failed);
        assert_eq!(heartbeat.status().consecutive_failures, 5);
    }
}
