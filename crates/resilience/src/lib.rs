//! Quotron Resilience Crate
//!
//! This crate keeps unreliable market data upstreams from taking their
//! callers down with them.
//!
//! # Overview
//!
//! Every upstream is served through the same stack:
//! - An in-process TTL cache in front of the upstream
//! - A circuit breaker that fast-fails while the upstream is down
//! - Exponential backoff retry for transient failures
//! - A health registry that records the latest observed status
//! - A heartbeat that keeps the health row fresh without user traffic
//!
//! # Architecture
//!
//! ```text
//!   request                       heartbeat (every interval)
//!      |                                  |
//!      v                                  |
//! +-----------+  hit                      |
//! | TtlCache  | ------> response          |
//! +-----------+                           |
//!      | miss                             |
//!      v                                  v
//! +------------------+           +------------------+
//! |  CircuitBreaker  | <-------- |  probe (canary)  |
//! +------------------+           +------------------+
//!      |
//!      v
//! +------------------+
//! |   RetryPolicy    |
//! +------------------+
//!      |
//!      v
//! +------------------+
//! |  UpstreamSource  |
//! +------------------+
//!      |
//!      v
//! +------------------+
//! |  HealthRegistry  |  (one row per source_type/source_name)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`ResilientProxy`] - Composes the stack around one [`UpstreamSource`]
//! - [`TtlCache`] - Per-key TTL cache with hit/miss/eviction counters
//! - [`CircuitBreaker`] - Closed/Open/HalfOpen guard for one upstream
//! - [`RetryPolicy`] - Exponential backoff with additive jitter
//! - [`HealthRegistry`] - Merges observations into [`HealthReport`] rows
//! - [`HeartbeatLoop`] - Periodic canary check for one proxy

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod guard;
pub mod health;
pub mod heartbeat;
pub mod proxy;

pub use cache::{CacheConfig, CacheStats, TtlCache, QUOTE_TTL, SLOW_DATA_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ResilienceConfig;
pub use errors::{ResilienceError, UserSignal};
pub use guard::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, RetryConfig, RetryPolicy,
    Retrying,
};
pub use health::{
    HealthError, HealthKey, HealthQuery, HealthRegistry, HealthReport, HealthStatus, HealthStore,
    HealthUpdate, InMemoryHealthStore, SystemHealth,
};
pub use heartbeat::{
    HeartbeatConfig, HeartbeatLoop, HeartbeatState, HeartbeatStatus, HeartbeatSupervisor,
};
pub use proxy::{ProxyStats, RequestStats, ResilientProxy, UpstreamSource};
