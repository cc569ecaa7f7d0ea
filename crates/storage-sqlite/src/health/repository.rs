//! Data source health repository implementation.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::sync::Arc;

use quotron_resilience::{HealthError, HealthKey, HealthReport, HealthStore};

use super::model::DataSourceHealthDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{Result, StorageError};
use crate::schema::data_source_health;
use crate::schema::data_source_health::dsl::*;

/// [`HealthStore`] backed by the `data_source_health` table.
///
/// Reads use pooled connections; upserts go through the writer actor.
pub struct SqliteHealthStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteHealthStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn get_impl(&self, key: &HealthKey) -> Result<Option<HealthReport>> {
        let mut conn = get_connection(&self.pool)?;
        let row = data_source_health
            .find((&key.source_type, &key.source_name))
            .first::<DataSourceHealthDB>(&mut conn)
            .optional()?;
        row.map(HealthReport::try_from).transpose()
    }

    fn list_impl(&self) -> Result<Vec<HealthReport>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = data_source_health
            .order((source_type.asc(), source_name.asc()))
            .load::<DataSourceHealthDB>(&mut conn)?;
        rows.into_iter().map(HealthReport::try_from).collect()
    }
}

#[async_trait]
impl HealthStore for SqliteHealthStore {
    async fn upsert(&self, report: &HealthReport) -> std::result::Result<(), HealthError> {
        let row = DataSourceHealthDB::try_from(report)?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(data_source_health::table)
                    .values(&row)
                    .on_conflict((source_type, source_name))
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
            .map_err(HealthError::from)
    }

    async fn get(&self, key: &HealthKey) -> std::result::Result<Option<HealthReport>, HealthError> {
        Ok(self.get_impl(key)?)
    }

    async fn list(&self) -> std::result::Result<Vec<HealthReport>, HealthError> {
        Ok(self.list_impl()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use chrono::Utc;
    use quotron_resilience::{HealthRegistry, HealthStatus, HealthUpdate};

    fn store() -> (tempfile::TempDir, SqliteHealthStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = init(dir.path().join("health.db").to_str().unwrap()).unwrap();
        let pool = create_pool(&db_path).unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone()).unwrap();
        (dir, SqliteHealthStore::new(pool, writer))
    }

    fn key(name: &str) -> HealthKey {
        HealthKey::new("api-scraper", name)
    }

    #[tokio::test]
    async fn test_get_missing_row() {
        let (_dir, store) = store();
        assert_eq!(store.get(&key("yfinance_proxy")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates_in_place() {
        let (_dir, store) = store();

        let first = HealthReport::merge(
            None,
            HealthUpdate::failed(key("yfinance_proxy"), "HTTP 503")
                .with_detail("Yahoo Finance")
                .with_metadata("circuit_state", "OPEN"),
            Utc::now(),
        );
        store.upsert(&first).await.unwrap();

        let second = HealthReport::merge(
            Some(&first),
            HealthUpdate::healthy(key("yfinance_proxy"), 95),
            Utc::now(),
        );
        store.upsert(&second).await.unwrap();

        let rows = store.list().await.unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.status, HealthStatus::Healthy);
        assert_eq!(row.error_count, 1);
        assert_eq!(row.error_message, None);
        assert_eq!(row.response_time_ms, Some(95));
        assert_eq!(row.source_detail, "Yahoo Finance");
        assert!(row.last_success.is_some());
        assert!(row.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_key() {
        let (_dir, store) = store();
        for name in ["yfinance_proxy", "economic_factors_proxy", "google_trends_proxy"] {
            let report = HealthReport::merge(None, HealthUpdate::healthy(key(name), 10), Utc::now());
            store.upsert(&report).await.unwrap();
        }

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.source_name)
            .collect();
        assert_eq!(
            names,
            vec!["economic_factors_proxy", "google_trends_proxy", "yfinance_proxy"]
        );
    }

    #[tokio::test]
    async fn test_registry_over_sqlite_counts_failures() {
        let (_dir, store) = store();
        let registry = HealthRegistry::new(Arc::new(store));

        for _ in 0..3 {
            registry
                .report(HealthUpdate::failed(key("economic_factors_proxy"), "HTTP 500"))
                .await
                .unwrap();
        }
        registry
            .report(HealthUpdate::new(key("economic_factors_proxy"), HealthStatus::Limited))
            .await
            .unwrap();

        let row = registry.get(&key("economic_factors_proxy")).await.unwrap();
        assert_eq!(row.error_count, 3);
        assert_eq!(row.status, HealthStatus::Limited);
        assert!(row.last_success.is_some());
    }
}
