use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::errors::HealthError;
use super::model::{HealthKey, HealthReport};
use super::traits::HealthStore;

/// Process-local health store.
///
/// Suitable for a single-process deployment; rows are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryHealthStore {
    rows: RwLock<BTreeMap<HealthKey, HealthReport>>,
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn upsert(&self, report: &HealthReport) -> Result<(), HealthError> {
        self.rows.write().await.insert(report.key(), report.clone());
        Ok(())
    }

    async fn get(&self, key: &HealthKey) -> Result<Option<HealthReport>, HealthError> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<HealthReport>, HealthError> {
        Ok(self.rows.read().await.values().cloned().collect())
    }
}
