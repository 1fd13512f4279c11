//! The circuit breaker (§4.E) gating both refresh and remote evaluation.
//!
//! State, the consecutive-fail counter, and `last_refresh` form one logical
//! unit (§9 design note) — all three live behind a single `Mutex` so a
//! metrics read or fallback decision never observes one without the others.

use crate::config::CircuitOptions;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    /// §4.I gauge encoding: 0=Closed, 1=HalfOpen, 2=Open.
    pub fn as_gauge(self) -> u8 {
        match self {
            State::Closed => 0,
            State::HalfOpen => 1,
            State::Open => 2,
        }
    }
}

struct Inner {
    state: State,
    consecutive_fails: u32,
    opened_at: Option<Instant>,
    last_refresh: Option<Instant>,
}

pub struct CircuitBreaker {
    options: CircuitOptions,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(options: CircuitOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_fails: 0,
                opened_at: None,
                last_refresh: None,
            }),
        }
    }

    /// Whether a gated call (refresh fetch or `EvaluateRemote`) is currently
    /// permitted. `Open` transitions itself to `HalfOpen` once `timeout` has
    /// elapsed, admitting exactly one probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            State::Closed => true,
            State::HalfOpen => false,
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.options.timeout {
                    inner.state = State::HalfOpen;
                    crate::metrics::circuit_state(State::HalfOpen.as_gauge());
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn consecutive_fails(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .consecutive_fails
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.inner.lock().expect("breaker lock poisoned").last_refresh
    }

    /// Record a successful gated call. Resets the failure counter; a probe
    /// succeeding in `HalfOpen` closes the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = State::Closed;
        inner.consecutive_fails = 0;
        crate::metrics::circuit_state(State::Closed.as_gauge());
    }

    /// Record a refresh success specifically, to keep `last_refresh` under
    /// the same lock as the rest of the breaker's state.
    pub fn record_refresh_success(&self, at: Instant) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = State::Closed;
        inner.consecutive_fails = 0;
        inner.last_refresh = Some(at);
        crate::metrics::circuit_state(State::Closed.as_gauge());
    }

    /// Record a failed gated call. A probe failing in `HalfOpen` reopens the
    /// breaker and resets its timer; in `Closed`, failures accumulate until
    /// `threshold` trips it open.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                crate::metrics::circuit_state(State::Open.as_gauge());
            }
            State::Closed => {
                inner.consecutive_fails += 1;
                if inner.consecutive_fails >= self.options.threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                    crate::metrics::circuit_state(State::Open.as_gauge());
                }
            }
            State::Open => {}
        }
    }

    pub fn half_open_timeout(&self) -> Duration {
        self.options.half_open_timeout
    }
}
