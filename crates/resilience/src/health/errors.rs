//! Health reporting error types.

use thiserror::Error;

/// Errors raised by the health registry and its backing stores.
///
/// None of these ever reach a proxy caller: the proxy and heartbeat loop
/// log them and carry on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// The report was malformed and nothing was written.
    #[error("Health report rejected: {0}")]
    Rejected(String),

    /// The backing store could not be read or written.
    #[error("Health store unavailable: {0}")]
    StoreUnavailable(String),
}

impl HealthError {
    /// Creates a StoreUnavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }
}
