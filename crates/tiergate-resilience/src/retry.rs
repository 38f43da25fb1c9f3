//! Detached background retries.
//!
//! After a fallback decision is served, the engine schedules a background
//! refresh so the cache returns to authoritative data once the store
//! recovers. Retries never block the caller and never hold locks across a
//! delay.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiergate_core::EngineError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
        }
    }
}

/// Schedules detached refresh attempts with exponential backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Spawn a detached task running `op` until it succeeds, returns a
    /// non-retryable error, or the attempt budget runs out. Resolves to
    /// `true` if the refresh eventually succeeded.
    pub fn spawn<F, Fut>(&self, label: impl Into<String>, mut op: F) -> JoinHandle<bool>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send,
    {
        let policy = self.policy;
        let label = label.into();
        tokio::spawn(async move {
            let mut delay = policy.initial_delay;
            for attempt in 1..=policy.max_attempts {
                tokio::time::sleep(delay).await;
                match op().await {
                    Ok(()) => {
                        debug!(task = %label, attempt, "background refresh succeeded");
                        return true;
                    }
                    Err(error) if error.retryable() && attempt < policy.max_attempts => {
                        warn!(
                            task = %label,
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "background refresh failed, retrying"
                        );
                        delay = std::cmp::min(delay * 2, policy.max_delay);
                    }
                    Err(error) => {
                        warn!(task = %label, attempt, error = %error, "background refresh abandoned");
                        return false;
                    }
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn stops_after_first_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let handle = RetryScheduler::new(fast_policy()).spawn("refresh", move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(EngineError::network("first attempt fails"))
                } else {
                    Ok(())
                }
            }
        });
        assert!(handle.await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let handle = RetryScheduler::new(fast_policy()).spawn("refresh", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(EngineError::store("still down"))
            }
        });
        assert!(!handle.await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_abort_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let handle = RetryScheduler::new(fast_policy()).spawn("refresh", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(EngineError::validation("bad key"))
            }
        });
        assert!(!handle.await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
