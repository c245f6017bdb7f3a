// SPDX-License-Identifier: MPL-2.0

//! Timeout and exponential backoff around remote fetches.

use crate::remote::RemoteError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Applied to each attempt separately
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Single attempt, still bounded by `timeout`.
    pub fn once(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            timeout,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling and capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && err.is_retryable() => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "remote call failed, retrying"
                );
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
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy {
            attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            timeout: Duration::from_secs(1),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let value = with_backoff(&policy, "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RemoteError::Network("connection reset".to_string()))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_last_attempt() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = with_backoff(&policy, "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status {
                status: 503,
                message: "unavailable".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), policy.attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_client_errors() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(&RetryPolicy::default(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::InvalidResponse("bad json".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out() {
        let policy = RetryPolicy::once(Duration::from_secs(2));

        let result: Result<(), _> = with_backoff(&policy, "test", || async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Timeout(d)) if d == Duration::from_secs(2)));
    }
}
