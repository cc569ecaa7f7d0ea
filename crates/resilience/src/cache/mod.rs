//! In-process TTL cache for upstream payloads.
//!
//! Keys are opaque strings (the proxy namespaces them per upstream), values
//! are whatever the upstream returned. Expired entries are reclaimed lazily
//! on access; there is no background sweeper.

mod stats;
mod ttl_cache;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ResilienceError;

pub use stats::CacheStats;
pub use ttl_cache::{CacheEntry, TtlCache};

/// TTL for fast-moving data such as quotes.
pub const QUOTE_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for slow-moving data such as search trends and economic indicators.
pub const SLOW_DATA_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit TTL.
    #[serde(rename = "default_ttl_secs", with = "crate::config::duration_secs")]
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: QUOTE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.default_ttl.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "cache default_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
