//! SQLite storage for Quotron.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the `HealthStore` trait defined in `quotron-resilience` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - A single-writer actor that serializes all writes
//! - The `data_source_health` repository
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies exist.
//! The resilience crate is storage-agnostic and works with the trait.
//!
//! ```text
//!      resilience (HealthStore)
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod health;
pub mod schema;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors
pub use errors::StorageError;

pub use health::SqliteHealthStore;
