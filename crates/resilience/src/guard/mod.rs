//! Guards around a single upstream call.
//!
//! - [`CircuitBreaker`]: fast-fails while an upstream is known to be down
//! - [`RetryPolicy`]: retries transient failures with exponential backoff
//!
//! The proxy nests them as breaker(retry(fetch)), so one exhausted retry
//! sequence is one breaker failure.

mod circuit_breaker;
mod retry_policy;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use retry_policy::{RetryConfig, RetryPolicy, Retrying};
