//! Bounded retry of transient range-read failures.
//!
//! [`RetryingReader`] wraps any [`RangeReader`] and re-issues reads that
//! failed with a transient error (see [`RangeError::is_transient`]).
//! Permanent failures such as out-of-bounds or not-found are returned
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use super::{BoxFuture, RangeError, RangeReader};

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (5 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 5;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a reader handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff, capped at `max_delay`.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier applied to delay after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Creates an exponential backoff policy with default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::exponential_from(max_attempts, Duration::from_millis(DEFAULT_INITIAL_DELAY_MS))
    }

    /// Creates an exponential backoff policy starting at `initial_delay`.
    pub fn exponential_from(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` if no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

/// A [`RangeReader`] that retries transient failures of an inner reader.
pub struct RetryingReader {
    inner: Arc<dyn RangeReader>,
    policy: RetryPolicy,
}

impl RetryingReader {
    pub fn new(inner: Arc<dyn RangeReader>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn with_retry<'a, T, F>(
        &'a self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, RangeError>
    where
        F: FnMut() -> BoxFuture<'a, Result<T, RangeError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => match self.policy.delay_for_attempt(attempt) {
                    Some(delay) => {
                        warn!(
                            source = %self.inner.describe(),
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient read failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl RangeReader for RetryingReader {
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
        Box::pin(self.with_retry("total_length", || self.inner.total_length()))
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>> {
        Box::pin(self.with_retry("read_range", move || self.inner.read_range(offset, length)))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` reads with the given error.
    struct FlakyReader {
        failures: u32,
        error: RangeError,
        calls: AtomicU32,
    }

    impl FlakyReader {
        fn new(failures: u32, error: RangeError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl RangeReader for FlakyReader {
        fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
            Box::pin(async { Ok(16) })
        }

        fn read_range(
            &self,
            _offset: u64,
            length: u64,
        ) -> BoxFuture<'_, Result<Bytes, RangeError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failures {
                    Err(self.error.clone())
                } else {
                    Ok(Bytes::from(vec![0u8; length as usize]))
                }
            })
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::exponential(4);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(5), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_none_policy() {
        assert_eq!(RetryPolicy::None.max_attempts(), 1);
        assert_eq!(RetryPolicy::None.delay_for_attempt(1), None);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(FlakyReader::new(2, RangeError::Transport("reset".into())));
        let reader = RetryingReader::new(inner.clone(), quick(3));

        let data = reader.read_range(0, 4).await.unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyReader::new(5, RangeError::Transport("reset".into())));
        let reader = RetryingReader::new(inner.clone(), quick(3));

        assert!(reader.read_range(0, 4).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let inner = Arc::new(FlakyReader::new(1, RangeError::NotFound("k".into())));
        let reader = RetryingReader::new(inner.clone(), quick(3));

        assert_eq!(
            reader.read_range(0, 4).await,
            Err(RangeError::NotFound("k".into()))
        );
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
