//! Per-upstream circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop calling an upstream that
//! is already failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, calls are allowed through.
//! - **Open**: Upstream is failing, calls are rejected without being made.
//! - **HalfOpen**: A limited number of trial calls probe for recovery.
//!
//! One breaker guards one upstream for the life of the process. State is
//! in-memory and resets on restart. The lock is held only while deciding
//! whether to admit a call and while recording its outcome; the upstream
//! call itself runs unlocked.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::errors::ResilienceError;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of trial calls allowed while HalfOpen.
const DEFAULT_MAX_HALF_OPEN_TRIALS: u32 = 3;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls are allowed.
    Closed,
    /// Upstream is failing - calls are rejected.
    Open,
    /// Testing recovery - limited trial calls allowed.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Internal mutable state of the circuit.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures since the last success.
    failure_count: u32,
    /// Monotonic time of the last failure (for the recovery timeout).
    last_failure_at: Option<Instant>,
    /// Wall-clock time of the last failure (for reporting).
    last_failure_utc: Option<DateTime<Utc>>,
    /// Trials admitted since entering HalfOpen. Only meaningful in HalfOpen.
    half_open_trial_count: u32,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            last_failure_utc: None,
            half_open_trial_count: 0,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait after the last failure before probing recovery.
    #[serde(rename = "recovery_timeout_secs", with = "crate::config::duration_secs")]
    pub recovery_timeout: Duration,
    /// Number of trial calls allowed through while HalfOpen.
    pub max_half_open_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            max_half_open_trials: DEFAULT_MAX_HALF_OPEN_TRIALS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::InvalidConfig(
                "circuit breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_half_open_trials == 0 {
            return Err(ResilienceError::InvalidConfig(
                "circuit breaker max_half_open_trials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable state of a circuit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub half_open_trial_count: u32,
}

/// Circuit breaker guarding a single upstream.
pub struct CircuitBreaker {
    /// Upstream name, used in errors and logs.
    name: String,
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a circuit breaker with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a circuit breaker reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            circuit: Mutex::new(Circuit::new()),
            config,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Lock the circuit mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly stale circuit
    /// state, which is better than panicking in every later caller.
    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex for '{}' was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`ResilienceError::CircuitOpen`] without invoking the
    /// operation when the circuit is Open (and the recovery timeout has not
    /// elapsed) or when the HalfOpen trial budget is used up. Otherwise the
    /// operation's own result is returned unchanged after being recorded.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        let mut permit = self.admit()?;
        let result = operation().await;

        match &result {
            Ok(_) => {
                self.record_success();
                permit.settle();
            }
            Err(e) if e.counts_as_failure() => {
                self.record_failure();
                permit.settle();
            }
            Err(e) => {
                // Unsettled permit gives back its trial slot on drop.
                debug!(
                    "Circuit breaker: '{}' ignoring non-upstream error: {}",
                    self.name, e
                );
            }
        }

        result
    }

    /// Decide whether a call may proceed, performing any Open -> HalfOpen
    /// transition on the way.
    fn admit(&self) -> Result<Permit<'_>, ResilienceError> {
        let mut circuit = self.lock_circuit();

        if circuit.state == CircuitState::Open {
            let elapsed = circuit
                .last_failure_at
                .map(|at| self.clock.now().saturating_duration_since(at));

            match elapsed {
                Some(elapsed) if elapsed >= self.config.recovery_timeout => {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        self.name
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_trial_count = 0;
                }
                _ => {
                    debug!("Circuit breaker: rejecting call to '{}' (Open)", self.name);
                    return Err(ResilienceError::circuit_open(&self.name));
                }
            }
        }

        if circuit.state == CircuitState::HalfOpen {
            if circuit.half_open_trial_count >= self.config.max_half_open_trials {
                debug!(
                    "Circuit breaker: rejecting call to '{}' (HalfOpen, {}/{} trials in flight)",
                    self.name, circuit.half_open_trial_count, self.config.max_half_open_trials
                );
                return Err(ResilienceError::circuit_open(&self.name));
            }
            circuit.half_open_trial_count += 1;
            debug!(
                "Circuit breaker: admitting trial {}/{} for '{}'",
                circuit.half_open_trial_count, self.config.max_half_open_trials, self.name
            );
            return Ok(Permit {
                breaker: self,
                trial: true,
                settled: false,
            });
        }

        Ok(Permit {
            breaker: self,
            trial: false,
            settled: false,
        })
    }

    /// Record a successful call.
    ///
    /// In Closed state: resets failure count.
    /// In HalfOpen state: closes the circuit.
    fn record_success(&self) {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        self.name
                    );
                }
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: closing circuit for '{}' after successful trial",
                    self.name
                );
                circuit.state = CircuitState::Closed;
                circuit.failure_count = 0;
                circuit.half_open_trial_count = 0;
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late.
                debug!(
                    "Circuit breaker: late success for '{}' while Open, ignoring",
                    self.name
                );
            }
        }
    }

    /// Record a failed call.
    ///
    /// Increments the failure count and may open the circuit.
    /// In HalfOpen state, any failure immediately reopens the circuit
    /// without resetting the failure count.
    fn record_failure(&self) {
        let mut circuit = self.lock_circuit();

        circuit.failure_count = circuit.failure_count.saturating_add(1);
        circuit.last_failure_at = Some(self.clock.now());
        circuit.last_failure_utc = Some(self.clock.utc_now());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        self.name, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        self.name, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker: reopening circuit for '{}' after failed trial",
                    self.name
                );
                circuit.state = CircuitState::Open;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    self.name
                );
            }
        }
    }

    /// Give back a HalfOpen trial slot for a call that produced no verdict.
    fn release_trial(&self) {
        let mut circuit = self.lock_circuit();
        if circuit.state == CircuitState::HalfOpen && circuit.half_open_trial_count > 0 {
            circuit.half_open_trial_count -= 1;
        }
    }

    /// Get the current state.
    ///
    /// This does not perform the Open -> HalfOpen transition; only a call
    /// attempt does.
    pub fn state(&self) -> CircuitState {
        self.lock_circuit().state
    }

    /// Get the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock_circuit().failure_count
    }

    /// Time left before an Open circuit will admit a trial call.
    ///
    /// Returns `None` unless the circuit is Open.
    pub fn retry_after(&self) -> Option<Duration> {
        let circuit = self.lock_circuit();
        if circuit.state != CircuitState::Open {
            return None;
        }
        let elapsed = circuit
            .last_failure_at
            .map(|at| self.clock.now().saturating_duration_since(at))
            .unwrap_or_default();
        Some(self.config.recovery_timeout.saturating_sub(elapsed))
    }

    /// Snapshot of the circuit for metrics and health metadata.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let circuit = self.lock_circuit();
        CircuitSnapshot {
            name: self.name.clone(),
            state: circuit.state,
            failure_count: circuit.failure_count,
            last_failure_at: circuit.last_failure_utc,
            half_open_trial_count: circuit.half_open_trial_count,
        }
    }

    /// Reset the circuit to Closed state.
    pub fn reset(&self) {
        let mut circuit = self.lock_circuit();
        info!("Circuit breaker: manually resetting circuit for '{}'", self.name);
        *circuit = Circuit::new();
    }
}

/// Admission ticket for one call.
///
/// A HalfOpen trial that is dropped without a verdict (the caller's future
/// was cancelled, or the error did not count) returns its slot so the
/// circuit cannot get stuck with its trial budget exhausted.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}
