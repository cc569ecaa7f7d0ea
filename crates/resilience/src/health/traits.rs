//! Health store interface.

use async_trait::async_trait;

use super::errors::HealthError;
use super::model::{HealthKey, HealthReport};

/// Storage interface for health reports.
///
/// Implementations only persist rows; merging an observation into a row
/// is done by [`HealthRegistry`](super::HealthRegistry) before `upsert`
/// is called.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Inserts the row, or replaces the row with the same key.
    async fn upsert(&self, report: &HealthReport) -> Result<(), HealthError>;

    /// Gets the row for `key`, if one was ever written.
    async fn get(&self, key: &HealthKey) -> Result<Option<HealthReport>, HealthError>;

    /// Gets every row, ordered by key.
    async fn list(&self) -> Result<Vec<HealthReport>, HealthError>;
}
