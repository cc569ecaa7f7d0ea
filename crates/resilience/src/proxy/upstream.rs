//! Upstream source trait definition.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ResilienceError;

/// Trait for the raw upstream behind a proxy.
///
/// Implement this trait to put a new data source behind a
/// [`ResilientProxy`](super::ResilientProxy). Implementations make one plain
/// call per `fetch`; caching, retries and circuit breaking are layered on
/// by the proxy.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quotron_resilience::proxy::UpstreamSource;
///
/// struct FredSource {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl UpstreamSource for FredSource {
///     fn source_name(&self) -> &str {
///         "economic_factors_proxy"
///     }
///
///     fn canary_key(&self) -> &str {
///         "GDP"
///     }
///
///     // ... implement fetch
/// }
/// ```
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Kind of source, the first half of the health key.
    fn source_type(&self) -> &str {
        "api-scraper"
    }

    /// Name of this source, the second half of the health key.
    ///
    /// Also namespaces this source's cache keys.
    fn source_name(&self) -> &str;

    /// Human-readable description stored with health reports.
    fn source_detail(&self) -> &str {
        self.source_name()
    }

    /// A cheap, deterministic request used by the heartbeat.
    fn canary_key(&self) -> &str;

    /// TTL for cached responses. `None` uses the cache's default.
    fn default_ttl(&self) -> Option<Duration> {
        None
    }

    /// Perform one call to the upstream.
    ///
    /// Transport failures, timeouts, non-success statuses and malformed
    /// payloads must all come back as `Err`.
    async fn fetch(&self, key: &str) -> Result<Value, ResilienceError>;
}
