//! Bounded-backoff retry for transient storage contention
//!
//! Contention retries transparently up to a budget, then escalates to
//! [`StorageError::Fatal`]. Non-transient errors pass straight through.

use crate::error::StorageError;
use std::future::Future;
use std::time::Duration;

/// Retry budget and backoff curve
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before escalation
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Ceiling for the exponential curve
    pub max_delay: Duration,
    /// Per-attempt delay multiplier
    pub multiplier: f64,
    /// How long one lock acquisition may pend before it counts as a
    /// transient failure
    pub acquire_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            acquire_timeout: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy that fails on the first contention (test hook)
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay before the given retry (0-based attempt index)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(24) as i32);
        let raw = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op`, retrying transient failures per `policy`
///
/// # Errors
/// The last transient error escalated via
/// [`StorageError::into_fatal`] once the budget is exhausted; any
/// non-transient error immediately.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    tracing::warn!(context, attempts = attempt, "retry budget exhausted");
                    return Err(err.into_fatal(context));
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::debug!(context, attempt, ?delay, "transient contention, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_curve_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(5));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert!(policy.delay_for(30) <= policy.max_delay);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&RetryPolicy::default(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StorageError::Contention("busy".into()))
            } else {
                Ok(7_u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_goes_fatal() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Contention("busy".into()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_pass_through() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Fatal("disk".into()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
