//! Data source health storage module.
//!
//! Provides persistence for the latest health report of each data source.

pub mod model;
pub mod repository;

pub use model::DataSourceHealthDB;
pub use repository::SqliteHealthStore;
