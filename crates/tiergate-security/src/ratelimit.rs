//! Per-actor sliding window rate limiting.
//!
//! Tracks individual mutation timestamps per actor for accurate limiting
//! across the window boundary. Rejection is an error surfaced to the
//! caller, never a silent drop.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter keyed by actor id.
pub struct ActorRateLimiter {
    /// Maximum mutations per window per actor.
    limit: u32,

    /// Window duration.
    window: Duration,

    /// Mutation timestamps per actor within the current window.
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ActorRateLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// One-minute window; the validator defaults to 50 per actor.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Try to record one mutation for `actor` now.
    pub fn try_acquire(&self, actor: &str) -> bool {
        self.try_acquire_at(actor, Instant::now())
    }

    /// Time-injectable variant used by the window-boundary tests.
    pub fn try_acquire_at(&self, actor: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(actor.to_string()).or_default();

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.limit as usize {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Remaining capacity for an actor in the current window.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn remaining(&self, actor: &str) -> u32 {
        let now = Instant::now();
        let windows = self.windows.lock();
        let used = windows.get(actor).map_or(0, |timestamps| {
            timestamps
                .iter()
                .filter(|at| now.duration_since(**at) <= self.window)
                .count()
        });
        self.limit.saturating_sub(used as u32)
    }

    /// Drop all recorded windows.
    pub fn reset(&self) {
        self.windows.lock().clear();
    }
}
