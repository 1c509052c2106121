//! Circuit breaker for the LLM endpoint.
//!
//! Consecutive failures open the circuit; while open, calls are refused
//! without touching the network. After the cool-down one probe call is
//! let through (half-open); its outcome closes or re-opens the circuit.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default consecutive failures before opening.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cool-down before a probe is allowed.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Externally visible circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probing: bool,
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    /// Create a breaker.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                opened_at: None,
                probing: false,
            }),
        }
    }

    /// Whether a call may proceed right now. While half-open, only one
    /// probe is admitted at a time.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.opened_at {
            None => true,
            Some(opened_at) => {
                if opened_at.elapsed() < self.cooldown {
                    false
                } else if inner.probing {
                    false
                } else {
                    inner.probing = true;
                    true
                }
            }
        }
    }

    /// Record a successful call; closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probing = false;
    }

    /// Record a failed call; may open (or re-open) the circuit.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.probing = false;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Current state, for health reporting.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) if opened_at.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }
}
