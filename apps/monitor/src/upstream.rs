//! HTTP implementation of [`UpstreamSource`].

use std::time::Duration;

use async_trait::async_trait;
use quotron_resilience::{ResilienceError, UpstreamSource};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::config::UpstreamConfig;

/// An upstream reached with one JSON `GET` per key.
pub struct HttpUpstream {
    client: Client,
    source_type: String,
    config: UpstreamConfig,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig, source_type: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            source_type: source_type.into(),
            config,
        })
    }

    /// `base_url` followed by the path template, one segment at a time.
    ///
    /// Each segment is percent-encoded, so a key holding `/`, `?` or `#`
    /// stays inside its own segment.
    fn url_for(&self, key: &str) -> Result<Url, ResilienceError> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            ResilienceError::upstream(&self.config.name, format!("Invalid base_url: {}", e))
        })?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ResilienceError::upstream(&self.config.name, "base_url cannot carry a path")
            })?;
            segments.pop_if_empty();
            for segment in self.config.path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&segment.replace("{key}", key));
            }
        }

        Ok(url)
    }

    fn map_error(&self, e: reqwest::Error, context: &str) -> ResilienceError {
        if e.is_timeout() {
            ResilienceError::timeout(&self.config.name)
        } else {
            ResilienceError::upstream(&self.config.name, format!("{}: {}", context, e))
        }
    }
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn source_name(&self) -> &str {
        &self.config.name
    }

    fn source_detail(&self) -> &str {
        self.config.detail.as_deref().unwrap_or(&self.config.name)
    }

    fn canary_key(&self) -> &str {
        &self.config.canary_key
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.config.ttl()
    }

    async fn fetch(&self, key: &str) -> Result<Value, ResilienceError> {
        let url = self.url_for(key)?;
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e, "Request failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResilienceError::upstream(
                &self.config.name,
                format!("HTTP {}", status),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.map_error(e, "Invalid response"))
    }
}
