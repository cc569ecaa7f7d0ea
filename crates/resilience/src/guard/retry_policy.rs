//! Exponential backoff retry for upstream calls.
//!
//! The policy never looks at the error it gets back: every failure is
//! retried until `max_retries` is used up, and the last error is returned
//! unchanged. Callers decide what is worth retrying by choosing what they
//! wrap.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::ResilienceError;

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff before the first retry.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default ceiling for any single backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Default growth factor between consecutive backoffs.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default upper bound of the additive jitter, as a fraction of the backoff.
const DEFAULT_JITTER_FRACTION: f64 = 0.1;

/// Retry configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    #[serde(rename = "initial_backoff_ms", with = "crate::config::duration_millis")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "crate::config::duration_millis")]
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ResilienceError::InvalidConfig(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(ResilienceError::InvalidConfig(format!(
                "retry jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ResilienceError::InvalidConfig(
                "retry initial_backoff must not exceed max_backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retries a fallible async operation with exponential backoff and jitter.
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self, ResilienceError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Unjittered backoff before retry number `attempt` (0-based).
    ///
    /// `initial_backoff * multiplier^attempt`, saturating at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let max = self.config.max_backoff.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.config.initial_backoff.as_secs_f64() * self.config.multiplier.powi(exponent);

        if raw.is_finite() && raw < max {
            Duration::from_secs_f64(raw.max(0.0))
        } else {
            self.config.max_backoff
        }
    }

    /// `backoff` plus a uniform random amount in `[0, jitter_fraction * backoff]`.
    pub fn jittered(&self, backoff: Duration) -> Duration {
        let max_jitter = backoff.as_secs_f64() * self.config.jitter_fraction;
        if !max_jitter.is_finite() || max_jitter <= 0.0 {
            return backoff;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=max_jitter);
        backoff + Duration::from_secs_f64(jitter)
    }

    /// Run `operation`, retrying every failure until the budget is spent.
    ///
    /// Returns the first success, or the error from the final attempt.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.config.max_retries => {
                    if self.config.max_retries > 0 {
                        error!(
                            "Retry: giving up after {} attempts: {}",
                            attempt + 1,
                            e
                        );
                    }
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.jittered(self.backoff_for(attempt));
                    warn!(
                        "Retry: attempt {}/{} failed: {}. Retrying in {:.2}s",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Bind `operation` to this policy so it can be passed around and
    /// invoked later with the same result type.
    pub fn wrap<F>(&self, operation: F) -> Retrying<'_, F> {
        Retrying {
            policy: self,
            operation,
        }
    }
}

/// An operation bound to a [`RetryPolicy`].
pub struct Retrying<'a, F> {
    policy: &'a RetryPolicy,
    operation: F,
}

impl<F> Retrying<'_, F> {
    pub async fn call<Fut, T, E>(&mut self) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.policy.run(&mut self.operation).await
    }
}
