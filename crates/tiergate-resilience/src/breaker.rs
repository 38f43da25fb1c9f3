//! Per-operation circuit breakers.
//!
//! A breaker opens after a run of consecutive failures and stays open for a
//! cooling-off period. After that a single trial call is let through; its
//! outcome decides whether the breaker closes again or re-opens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before allowing a trial.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// Set while the single half-open trial call is outstanding.
    trial_in_flight: bool,
}

/// Breaker for one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call may proceed right now. An open breaker that has
    /// cooled off transitions to half-open and admits exactly one trial.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = inner
                    .last_failure
                    .is_some_and(|at| now.duration_since(at) >= self.config.open_duration);
                if cooled {
                    info!(breaker = %self.name, "circuit breaker half-open, admitting trial call");
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!(breaker = %self.name, "circuit breaker closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);
        inner.trial_in_flight = false;
        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
            inner.state = BreakerState::Open;
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state_at(Instant::now())
    }

    /// Reported state, surfacing half-open once the cooling-off period has
    /// elapsed even if no call has touched the breaker yet.
    #[must_use]
    pub fn state_at(&self, now: Instant) -> BreakerState {
        let inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            let cooled = inner
                .last_failure
                .is_some_and(|at| now.duration_since(at) >= self.config.open_duration);
            if cooled {
                return BreakerState::HalfOpen;
            }
        }
        inner.state
    }
}

/// Lazily-created breakers keyed by operation name.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(operation.to_owned())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, self.config))),
        )
    }

    /// Snapshot of every breaker's state, for monitoring output.
    #[must_use]
    pub fn states(&self) -> HashMap<String, BreakerState> {
        let breakers = self.breakers.lock();
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
