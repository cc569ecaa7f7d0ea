use std::time::Duration;

use anyhow::Context;
use quotron_resilience::{ResilienceConfig, QUOTE_TTL, SLOW_DATA_TTL};
use serde::Deserialize;

const DEFAULT_SOURCE_TYPE: &str = "api-scraper";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// One upstream HTTP endpoint watched by the monitor.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub base_url: String,
    /// Path appended to `base_url`; `{key}` is replaced by the request key.
    #[serde(default = "default_path")]
    pub path: String,
    pub canary_key: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_path() -> String {
    "/{key}".to_string()
}

impl UpstreamConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

pub struct Config {
    pub db_path: String,
    pub source_type: String,
    pub resilience: ResilienceConfig,
    pub upstreams: Vec<UpstreamConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let db_path = lookup("QUOTRON_DB_PATH").unwrap_or_else(|| "./db/health.db".into());
        let source_type =
            lookup("QUOTRON_SOURCE_TYPE").unwrap_or_else(|| DEFAULT_SOURCE_TYPE.into());

        let mut resilience: ResilienceConfig = match lookup("QUOTRON_RESILIENCE") {
            Some(raw) => serde_json::from_str(&raw).context("Invalid QUOTRON_RESILIENCE")?,
            None => ResilienceConfig::default(),
        };
        if let Some(raw) = lookup("QUOTRON_HEARTBEAT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid QUOTRON_HEARTBEAT_SECS '{}'", raw))?;
            resilience.heartbeat.interval = Duration::from_secs(secs);
        }
        resilience.validate()?;

        let upstreams = match lookup("QUOTRON_UPSTREAMS") {
            Some(raw) => serde_json::from_str(&raw).context("Invalid QUOTRON_UPSTREAMS")?,
            None => default_upstreams(),
        };
        for upstream in &upstreams {
            validate_upstream(upstream)?;
        }

        Ok(Self {
            db_path,
            source_type,
            resilience,
            upstreams,
        })
    }
}

fn validate_upstream(upstream: &UpstreamConfig) -> anyhow::Result<()> {
    if upstream.name.trim().is_empty() {
        anyhow::bail!("Upstream name must not be empty");
    }
    if upstream.canary_key.trim().is_empty() {
        anyhow::bail!("Upstream '{}' has no canary key", upstream.name);
    }
    let base_url = reqwest::Url::parse(&upstream.base_url)
        .with_context(|| format!("Upstream '{}' has an invalid base_url", upstream.name))?;
    if base_url.cannot_be_a_base() {
        anyhow::bail!("Upstream '{}' base_url cannot carry a path", upstream.name);
    }
    if upstream.timeout_secs == Some(0) {
        anyhow::bail!("Upstream '{}' timeout must be greater than zero", upstream.name);
    }
    if upstream.ttl_secs == Some(0) {
        anyhow::bail!("Upstream '{}' ttl must be greater than zero", upstream.name);
    }
    Ok(())
}

/// The two proxies of a local scraper deployment.
fn default_upstreams() -> Vec<UpstreamConfig> {
    vec![
        UpstreamConfig {
            name: "yfinance_proxy".to_string(),
            base_url: "http://localhost:5000".to_string(),
            path: "/quote/{key}".to_string(),
            canary_key: "AAPL".to_string(),
            detail: Some("Yahoo Finance Proxy".to_string()),
            ttl_secs: Some(QUOTE_TTL.as_secs()),
            timeout_secs: None,
        },
        UpstreamConfig {
            name: "economic_factors_proxy".to_string(),
            base_url: "http://localhost:5002".to_string(),
            path: "/indicator/{key}".to_string(),
            canary_key: "GDP".to_string(),
            detail: Some("Economic Factors Proxy".to_string()),
            ttl_secs: Some(SLOW_DATA_TTL.as_secs()),
            timeout_secs: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.db_path, "./db/health.db");
        assert_eq!(config.source_type, "api-scraper");
        assert_eq!(config.resilience, ResilienceConfig::default());

        let names: Vec<&str> = config.upstreams.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["yfinance_proxy", "economic_factors_proxy"]);
        assert_eq!(config.upstreams[0].ttl(), Some(QUOTE_TTL));
        assert_eq!(config.upstreams[1].ttl(), Some(SLOW_DATA_TTL));
        assert_eq!(config.upstreams[0].timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_upstreams_from_json() {
        let config = config_from(&[(
            "QUOTRON_UPSTREAMS",
            r#"[{"name": "google_trends_proxy", "base_url": "http://localhost:5001",
                 "canary_key": "bitcoin", "timeout_secs": 3}]"#,
        )])
        .unwrap();

        assert_eq!(config.upstreams.len(), 1);
        let upstream = &config.upstreams[0];
        assert_eq!(upstream.path, "/{key}");
        assert_eq!(upstream.detail, None);
        assert_eq!(upstream.ttl(), None);
        assert_eq!(upstream.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_heartbeat_secs_overrides_resilience_json() {
        let config = config_from(&[
            (
                "QUOTRON_RESILIENCE",
                r#"{"retry": {"max_retries": 1}, "heartbeat": {"interval_secs": 30}}"#,
            ),
            ("QUOTRON_HEARTBEAT_SECS", "15"),
        ])
        .unwrap();

        assert_eq!(config.resilience.retry.max_retries, 1);
        assert_eq!(config.resilience.heartbeat.interval, Duration::from_secs(15));
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("QUOTRON_HEARTBEAT_SECS", "soon")]).is_err());
        assert!(config_from(&[("QUOTRON_HEARTBEAT_SECS", "0")]).is_err());
        assert!(config_from(&[("QUOTRON_UPSTREAMS", "not json")]).is_err());
        assert!(config_from(&[(
            "QUOTRON_UPSTREAMS",
            r#"[{"name": "", "base_url": "http://localhost:5000", "canary_key": "AAPL"}]"#,
        )])
        .is_err());
        assert!(config_from(&[(
            "QUOTRON_UPSTREAMS",
            r#"[{"name": "yfinance_proxy", "base_url": "localhost", "canary_key": "AAPL"}]"#,
        )])
        .is_err());
    }
}
