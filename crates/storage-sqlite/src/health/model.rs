//! Database model for data source health rows.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use quotron_resilience::{HealthReport, HealthStatus};

use crate::errors::{Result, StorageError};

/// Database model for data source health
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::data_source_health)]
#[diesel(primary_key(source_type, source_name))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DataSourceHealthDB {
    pub source_type: String,
    pub source_name: String,
    pub source_detail: String,
    pub status: String,
    pub last_check: String,
    pub last_success: Option<String>,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub response_time_ms: Option<i64>,
    pub metadata: String,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("invalid timestamp '{}': {}", value, e)))
}

impl TryFrom<DataSourceHealthDB> for HealthReport {
    type Error = StorageError;

    fn try_from(db: DataSourceHealthDB) -> Result<Self> {
        // Rows written by other tools may carry statuses we do not know.
        let status = db.status.parse().unwrap_or(HealthStatus::Unknown);

        Ok(Self {
            last_check: parse_timestamp(&db.last_check)?,
            last_success: db.last_success.as_deref().map(parse_timestamp).transpose()?,
            metadata: serde_json::from_str(&db.metadata)?,
            source_type: db.source_type,
            source_name: db.source_name,
            source_detail: db.source_detail,
            status,
            error_count: db.error_count,
            error_message: db.error_message,
            response_time_ms: db.response_time_ms,
        })
    }
}

impl TryFrom<&HealthReport> for DataSourceHealthDB {
    type Error = StorageError;

    fn try_from(domain: &HealthReport) -> Result<Self> {
        Ok(Self {
            source_type: domain.source_type.clone(),
            source_name: domain.source_name.clone(),
            source_detail: domain.source_detail.clone(),
            status: domain.status.as_str().to_string(),
            last_check: domain.last_check.to_rfc3339(),
            last_success: domain.last_success.map(|dt| dt.to_rfc3339()),
            error_count: domain.error_count,
            error_message: domain.error_message.clone(),
            response_time_ms: domain.response_time_ms,
            metadata: serde_json::to_string(&domain.metadata)?,
        })
    }
}
