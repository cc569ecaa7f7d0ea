//! The request-handler boundary.
//!
//! [`ResilientProxy`] composes a [`TtlCache`](crate::TtlCache), a
//! [`CircuitBreaker`](crate::CircuitBreaker), a
//! [`RetryPolicy`](crate::RetryPolicy) and a
//! [`HealthRegistry`](crate::HealthRegistry) around one [`UpstreamSource`].

mod resilient_proxy;
mod stats;
mod upstream;

pub use resilient_proxy::ResilientProxy;
pub(crate) use resilient_proxy::millis;
pub use stats::{ProxyStats, RequestStats};
pub use upstream::UpstreamSource;
