//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::store::LedgerError {
    fn is_retryable(&self) -> bool {
        crate::store::LedgerError::is_retryable(self)
    }
}

/// Retry policy: up to `max_attempts` tries, sleeping
/// `(attempt + 1) * base_delay` (capped at `max_delay`) between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps; used in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a terminal error, or the
    /// attempts are used up. Returns the last error.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_linear_backoff_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
        assert_eq!(policy.delay_for(10), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, TestError> = RetryPolicy::immediate(3)
            .run("test", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), TestError> = RetryPolicy::immediate(5)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: false })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), TestError> = RetryPolicy::immediate(3)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: true })
            })
            .await;
        assert!(result.unwrap_err().retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
