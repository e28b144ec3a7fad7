//! The retry executor: one bounded-retry implementation shared by every
//! driver-facing call site.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Attempt budget and backoff shape for one operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * base_delay` before retrying.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000))
    }
}

/// Runs `op` up to the policy's attempt budget with linear backoff
/// between failures.
///
/// Non-transient failures (see [`SessionError::is_transient`]) propagate
/// immediately without consuming further attempts. When the budget runs
/// out, the last failure is wrapped with the label and attempt count.
/// Health state is never touched here; this is purely an operation
/// wrapper.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.max_attempts {
        debug!(
            target = "watify.retry",
            label,
            attempt,
            max_attempts = policy.max_attempts,
            "attempt"
        );

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => {
                debug!(target = "watify.retry", label, %error, "non-transient failure, not retrying");
                return Err(error);
            }
            Err(error) if attempt == policy.max_attempts => {
                warn!(
                    target = "watify.retry",
                    label,
                    attempts = attempt,
                    %error,
                    "giving up"
                );
                return Err(SessionError::Retry {
                    label: label.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
            Err(error) => {
                let delay = policy.backoff(attempt);
                warn!(
                    target = "watify.retry",
                    label,
                    attempt,
                    %error,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn immediate() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);

        let result = execute(&immediate(), "flaky op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(SessionError::TransientSend(format!("attempt {n} failed")))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_exactly_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute(&immediate(), "doomed op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::TransientSend("nope".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            SessionError::Retry {
                label, attempts, ..
            } => {
                assert_eq!(label, "doomed op");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected retry wrapper, got {other}"),
        }
    }

    #[tokio::test]
    async fn non_transient_failure_short_circuits() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute(&immediate(), "rejected op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::NotReady)
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), SessionError::NotReady));
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let result = execute(&policy, "clamped", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1_000));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
    }
}
