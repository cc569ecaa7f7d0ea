//! Health reporting for data sources.
//!
//! This module provides:
//! - Domain models ([`HealthStatus`], [`HealthKey`], [`HealthReport`], [`HealthUpdate`])
//! - The [`HealthStore`] persistence trait and an in-memory implementation
//! - [`HealthRegistry`], which merges observations into rows and answers queries
//!
//! One row exists per `(source_type, source_name)`. Rows are created by the
//! first report for a key and updated in place after that; nothing here
//! deletes them.

mod errors;
mod memory_store;
mod model;
mod registry;
mod traits;

pub use errors::HealthError;
pub use memory_store::InMemoryHealthStore;
pub use model::{
    HealthKey, HealthQuery, HealthReport, HealthStatus, HealthUpdate, SystemHealth,
};
pub use registry::HealthRegistry;
pub use traits::HealthStore;
