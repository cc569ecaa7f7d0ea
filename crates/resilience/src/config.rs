//! Aggregated configuration for one proxied upstream.
//!
//! Each component owns its own config type next to its implementation;
//! [`ResilienceConfig`] bundles them so a proxy can be configured from a
//! single deserialized document:
//!
//! ```json
//! {
//!   "cache": { "default_ttl_secs": 300 },
//!   "retry": { "max_retries": 3, "initial_backoff_ms": 1000 },
//!   "circuit_breaker": { "failure_threshold": 5, "recovery_timeout_secs": 60 },
//!   "heartbeat": { "interval_secs": 60 }
//! }
//! ```
//!
//! Omitted fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::errors::ResilienceError;
use crate::guard::{CircuitBreakerConfig, RetryConfig};
use crate::heartbeat::HeartbeatConfig;

/// Configuration for the whole cache, breaker, retry and heartbeat stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub heartbeat: HeartbeatConfig,
}

impl ResilienceConfig {
    /// Validates every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        self.cache.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.heartbeat.validate()?;
        Ok(())
    }
}

/// Serde adapter for `Duration` fields stored as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Serde adapter for `Duration` fields stored as milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ResilienceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: ResilienceConfig = serde_json::from_str(
            r#"{
                "cache": { "default_ttl_secs": 3600 },
                "circuit_breaker": { "failure_threshold": 3 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(
            config.circuit_breaker.recovery_timeout,
            CircuitBreakerConfig::default().recovery_timeout
        );
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_validate_reports_invalid_section() {
        let mut config = ResilienceConfig::default();
        config.retry.multiplier = 0.5;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidConfig(_)));
    }

    #[test]
    fn test_serialize_uses_unit_suffixed_fields() {
        let json = serde_json::to_value(ResilienceConfig::default()).unwrap();
        assert_eq!(json["cache"]["default_ttl_secs"], 300);
        assert_eq!(json["retry"]["initial_backoff_ms"], 1000);
        assert_eq!(json["heartbeat"]["interval_secs"], 60);
    }
}
