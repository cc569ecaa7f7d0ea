//! Error types for the resilience layer.
//!
//! This module provides:
//! - [`ResilienceError`]: The error enum for guarded upstream calls
//! - [`UserSignal`]: Classification of a failure for the request handler
//!
//! A cache miss is not an error; [`TtlCache::get`](crate::TtlCache::get)
//! returns `None`. Health-store failures have their own type,
//! [`HealthError`](crate::health::HealthError), because they never reach
//! a request's caller.

mod signal;

pub use signal::UserSignal;

use thiserror::Error;

/// Errors that can occur when calling an upstream through the resilience stack.
///
/// Each variant maps to a [`UserSignal`] via [`user_signal`](Self::user_signal).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// The upstream answered with an error or a malformed payload.
    /// Retried by the retry policy and counted by the circuit breaker.
    #[error("Upstream error: {upstream} - {message}")]
    Upstream {
        /// The upstream that failed
        upstream: String,
        /// The error message from the upstream or its client
        message: String,
    },

    /// The upstream did not answer within the caller's timeout.
    /// Treated exactly like [`Upstream`](Self::Upstream).
    #[error("Timeout: {upstream}")]
    Timeout {
        /// The upstream that timed out
        upstream: String,
    },

    /// The circuit breaker rejected the call without invoking the upstream.
    /// Never counted as a breaker failure.
    #[error("Circuit open: {upstream} is temporarily unavailable")]
    CircuitOpen {
        /// The upstream whose circuit is open
        upstream: String,
    },

    /// A component was constructed with an invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// Creates an `Upstream` error.
    pub fn upstream(upstream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            upstream: upstream.into(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(upstream: impl Into<String>) -> Self {
        Self::Timeout {
            upstream: upstream.into(),
        }
    }

    /// Creates a `CircuitOpen` error.
    pub fn circuit_open(upstream: impl Into<String>) -> Self {
        Self::CircuitOpen {
            upstream: upstream.into(),
        }
    }

    /// Returns true if this is a fast-fail rejection from a circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns true if this error should count against a circuit breaker.
    ///
    /// Rejections from a (possibly nested) breaker are not upstream failures
    /// and must not be double-counted.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. })
    }

    /// Returns the signal a request handler should surface for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotron_resilience::errors::{ResilienceError, UserSignal};
    ///
    /// let error = ResilienceError::circuit_open("yfinance_proxy");
    /// assert_eq!(error.user_signal(), UserSignal::Unavailable);
    ///
    /// let error = ResilienceError::timeout("yfinance_proxy");
    /// assert_eq!(error.user_signal(), UserSignal::UpstreamFailure);
    /// ```
    pub fn user_signal(&self) -> UserSignal {
        match self {
            Self::CircuitOpen { .. } => UserSignal::Unavailable,
            Self::Upstream { .. } | Self::Timeout { .. } => UserSignal::UpstreamFailure,
            Self::InvalidConfig(_) => UserSignal::Misconfigured,
        }
    }
}
