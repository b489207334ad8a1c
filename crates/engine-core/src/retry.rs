use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};

/// How a failed call should be treated by [`RetryPolicy::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Classified as [`RetryDisposition::Stop`] on the given attempt.
    Fatal { error: E, attempt: u32 },
    /// Still retryable after the last allowed attempt.
    Exhausted { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Bounded exponential backoff for calls to the generation service.
///
/// Delays double from `base_delay` and never exceed `max_delay`. A zero base
/// delay retries immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Few attempts with short waits, for calls made while a caller is waiting.
    pub fn for_remote() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_secs(2))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Calls `op` until it succeeds, `classify` says stop, or attempts run out.
    pub async fn run<F, Fut, T, E, C>(&self, mut op: F, classify: C) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if classify(&error) == RetryDisposition::Stop {
                return Err(RetryError::Fatal { error, attempt });
            }
            if attempt >= self.attempts {
                warn!(attempts = attempt, error = %error, "Giving up after repeated transient errors");
                return Err(RetryError::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.delay_before(attempt + 1);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Transient error, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Wait before the `attempt`-th call (the second call waits `base_delay`).
    fn delay_before(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(2).min(16);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_remote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = instant(3)
            .run(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("503".to_string())
                    } else {
                        Ok(7)
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_stops_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = instant(5)
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("401".to_string())
                },
                |_| RetryDisposition::Stop,
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Fatal { attempt: 1, .. }));
        assert_eq!(err.into_inner(), "401");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_reports_attempt_count() {
        let result: Result<(), RetryError<String>> = instant(2)
            .run(|| async { Err("timeout".to_string()) }, |_| RetryDisposition::Retry)
            .await;
        assert_eq!(result.unwrap_err().attempts(), 2);
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
        assert_eq!(policy.delay_before(9), Duration::from_millis(500));
    }
}
