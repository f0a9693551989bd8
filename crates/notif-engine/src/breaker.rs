// Circuit Breaker: suppresses scheduling and persistence attempts after a
// run of consecutive external failures, and re-admits them after a
// cool-down.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::CircuitBreakerConfig;

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    /// Monotonic timestamp of the open transition, None while closed.
    /// `Instant` keeps the cool-down on wall time, independent of any
    /// pausable simulation clock.
    open_since: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
///
/// CLOSED → OPEN after `failure_threshold` consecutive failures; OPEN →
/// CLOSED once a periodic [`CircuitBreaker::tick`] observes the cool-down
/// elapsed. While open, callers must short-circuit without attempting the
/// underlying operation.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_since: None,
            }),
        }
    }

    /// Record an external failure. Returns true when this failure opened
    /// the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.open_since.is_none() && state.consecutive_failures >= self.config.failure_threshold
        {
            state.open_since = Some(Instant::now());
            warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "circuit breaker opened"
            );
            return true;
        }
        false
    }

    /// Record a successful external operation, resetting the failure run.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
    }

    /// Whether operations must currently short-circuit.
    pub fn is_open(&self) -> bool {
        self.state.lock().open_since.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Periodic check; closes the circuit once the cool-down has elapsed
    /// since the most recent open transition. Returns true if it closed
    /// the circuit.
    pub fn tick(&self) -> bool {
        let mut state = self.state.lock();
        match state.open_since {
            Some(opened) if opened.elapsed() >= self.config.cooldown => {
                state.open_since = None;
                state.consecutive_failures = 0;
                debug!("circuit breaker closed after cool-down");
                true
            }
            _ => false,
        }
    }
}
