//! Health reporting domain models.
//!
//! - [`HealthStatus`]: the observed state of an upstream
//! - [`HealthKey`]: `(source_type, source_name)`, the identity of a row
//! - [`HealthReport`]: the stored row
//! - [`HealthUpdate`]: one observation to be merged into a row
//! - [`SystemHealth`]: the roll-up across every row

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::HealthError;

// =============================================================================
// Health Status
// =============================================================================

/// Observed status of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
    /// Answering, but rate-limited or otherwise restricted.
    Limited,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Failed => "failed",
            HealthStatus::Limited => "limited",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// True when the upstream answered, even if imperfectly.
    ///
    /// Reports with such a status advance `last_success`.
    pub fn counts_as_success(&self) -> bool {
        matches!(
            self,
            HealthStatus::Healthy | HealthStatus::Degraded | HealthStatus::Limited
        )
    }

    /// The three-state vocabulary used by older dashboards.
    pub fn legacy_label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded | HealthStatus::Limited => "degraded",
            HealthStatus::Failed => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "failed" => Ok(HealthStatus::Failed),
            "limited" => Ok(HealthStatus::Limited),
            "unknown" => Ok(HealthStatus::Unknown),
            other => Err(HealthError::Rejected(format!(
                "unknown health status '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Health Key
// =============================================================================

/// Composite identity of a health row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HealthKey {
    /// Kind of source, e.g. "api-scraper".
    pub source_type: String,
    /// Source instance, e.g. "yfinance_proxy".
    pub source_name: String,
}

impl HealthKey {
    pub fn new(source_type: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_name: source_name.into(),
        }
    }

    /// Rejects keys with an empty part.
    pub fn validate(&self) -> Result<(), HealthError> {
        if self.source_type.trim().is_empty() {
            return Err(HealthError::Rejected(
                "source_type must not be empty".to_string(),
            ));
        }
        if self.source_name.trim().is_empty() {
            return Err(HealthError::Rejected(
                "source_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for HealthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_type, self.source_name)
    }
}

// =============================================================================
// Health Report
// =============================================================================

/// Latest known health of one data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub source_type: String,
    pub source_name: String,
    pub source_detail: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    /// Last time the source answered; `None` until it first does.
    pub last_success: Option<DateTime<Utc>>,
    /// Lifetime count of Failed reports. Never reset by this crate.
    pub error_count: i64,
    pub error_message: Option<String>,
    pub response_time_ms: Option<i64>,
    pub metadata: Map<String, Value>,
}

impl HealthReport {
    pub fn key(&self) -> HealthKey {
        HealthKey::new(&self.source_type, &self.source_name)
    }

    /// Merges `update` on top of `previous` (the current row, if any),
    /// observed at `now`.
    ///
    /// The status, error text, latency and metadata are replaced outright.
    /// `last_success` only moves on a successful status and `error_count`
    /// only grows on Failed. A missing detail keeps the previous one.
    pub fn merge(previous: Option<&HealthReport>, update: HealthUpdate, now: DateTime<Utc>) -> Self {
        let last_success = if update.status.counts_as_success() {
            Some(now)
        } else {
            previous.and_then(|p| p.last_success)
        };

        let mut error_count = previous.map(|p| p.error_count).unwrap_or(0);
        if update.status == HealthStatus::Failed {
            error_count = error_count.saturating_add(1);
        }

        let source_detail = update
            .source_detail
            .or_else(|| previous.map(|p| p.source_detail.clone()))
            .unwrap_or_default();

        Self {
            source_type: update.key.source_type,
            source_name: update.key.source_name,
            source_detail,
            status: update.status,
            last_check: now,
            last_success,
            error_count,
            error_message: update.error_message,
            response_time_ms: update.response_time_ms,
            metadata: update.metadata,
        }
    }
}

// =============================================================================
// Health Update
// =============================================================================

/// A single observation to record against a health row.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthUpdate {
    pub key: HealthKey,
    pub status: HealthStatus,
    pub source_detail: Option<String>,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
}

impl HealthUpdate {
    pub fn new(key: HealthKey, status: HealthStatus) -> Self {
        Self {
            key,
            status,
            source_detail: None,
            response_time_ms: None,
            error_message: None,
            metadata: Map::new(),
        }
    }

    pub fn healthy(key: HealthKey, response_time_ms: i64) -> Self {
        Self::new(key, HealthStatus::Healthy).with_response_time(response_time_ms)
    }

    pub fn failed(key: HealthKey, error_message: impl Into<String>) -> Self {
        Self::new(key, HealthStatus::Failed).with_error(error_message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.source_detail = Some(detail.into());
        self
    }

    pub fn with_response_time(mut self, response_time_ms: i64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }

    /// Adds one metadata entry. Values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

// =============================================================================
// Health Query
// =============================================================================

/// Result of [`HealthRegistry::query`](super::HealthRegistry::query).
#[derive(Debug, Clone, PartialEq)]
pub enum HealthQuery {
    /// Both key parts were given.
    One(Option<HealthReport>),
    /// Anything less than a full key lists everything.
    All(Vec<HealthReport>),
}

// =============================================================================
// System Health
// =============================================================================

/// Overall health across every known source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// 0-100. Healthy sources count fully, degraded and limited ones half.
    pub health_score: f64,
    pub health_reports: Vec<HealthReport>,
    pub last_check: DateTime<Utc>,
    pub total_services: usize,
    pub healthy_count: usize,
    /// Degraded and limited sources.
    pub degraded_count: usize,
    pub failed_count: usize,
}

impl SystemHealth {
    pub fn from_reports(reports: Vec<HealthReport>, now: DateTime<Utc>) -> Self {
        let mut healthy_count = 0;
        let mut degraded_count = 0;
        let mut failed_count = 0;
        let mut score = 0.0;

        for report in &reports {
            match report.status {
                HealthStatus::Healthy => {
                    healthy_count += 1;
                    score += 1.0;
                }
                HealthStatus::Degraded | HealthStatus::Limited => {
                    degraded_count += 1;
                    score += 0.5;
                }
                HealthStatus::Failed => failed_count += 1,
                HealthStatus::Unknown => {}
            }
        }

        let total_services = reports.len();
        let health_score = if total_services == 0 {
            0.0
        } else {
            score / total_services as f64 * 100.0
        };

        Self {
            health_score,
            health_reports: reports,
            last_check: now,
            total_services,
            healthy_count,
            degraded_count,
            failed_count,
        }
    }
}
