//! Periodic canary checks.
//!
//! A [`HeartbeatLoop`] keeps the health row of its upstream current even
//! when no user traffic arrives. A [`HeartbeatSupervisor`] owns the running
//! loops and stops them together.

mod heartbeat_loop;
mod supervisor;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ResilienceError;

pub use heartbeat_loop::{HeartbeatLoop, HeartbeatState, HeartbeatStatus};
pub use supervisor::HeartbeatSupervisor;

/// Default time between canary checks.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default length of a failure streak after which the loop reports failed.
const DEFAULT_FAILED_AFTER: u32 = 3;

/// Heartbeat configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(rename = "interval_secs", with = "crate::config::duration_secs")]
    pub interval: Duration,
    /// Consecutive failures before the local state moves from degraded to
    /// failed.
    pub failed_after: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            failed_after: DEFAULT_FAILED_AFTER,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.interval.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.failed_after == 0 {
            return Err(ResilienceError::InvalidConfig(
                "heartbeat failed_after must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
