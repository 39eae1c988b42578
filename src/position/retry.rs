//! Bounded retry shared by buys and sells

use backoff::backoff::Constant;
use backoff::future::retry_notify;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Up to `max_retries + 1` attempts, `delay` apart. Only errors that
/// report `is_retryable()` earn another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` with the 1-based attempt number until it succeeds, fails
    /// permanently or runs out of attempts. Returns the attempts used.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempts = 0u32;

        let operation = || {
            attempts += 1;
            let attempt = attempts;
            let fut = op(attempt);
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_retryable() && attempt < max_attempts => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        };

        let result = retry_notify(Constant::new(self.delay), operation, |e: Error, wait: Duration| {
            warn!("{} attempt failed: {}, retrying in {:?}", label, e, wait)
        })
        .await;

        (result, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_max_retries() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let (result, attempts): (Result<()>, u32) = policy
            .run("buy", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Submit("relay busy".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::Submit(_))));
        assert_eq!(attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let (result, attempts): (Result<()>, u32) = policy
            .run("buy", |_| async {
                Err(Error::InsufficientBalance {
                    available: 0,
                    required: 1,
                })
            })
            .await;

        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let (result, attempts) = policy
            .run("sell", |attempt| async move {
                if attempt < 3 {
                    Err(Error::ConfirmTimeout {
                        signature: "sig".into(),
                        timeout_ms: 10,
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
        // two fixed waits between three attempts
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let (result, attempts): (Result<()>, u32) = policy
            .run("sell", |_| async { Err(Error::Submit("x".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
