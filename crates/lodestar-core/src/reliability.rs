//! Retry with backoff
//!
//! Store failures are transient more often than not, and a reconciliation
//! pass is safe to repeat, so callers wrap whole passes in a `RetryPolicy`.
//! Only errors the caller classifies as retryable are retried.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Backoff strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase: delay * attempt
    Linear,
    /// Exponential increase: delay * 2^attempt
    Exponential,
    /// Exponential with up to 10% random jitter
    ExponentialWithJitter,
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0 = first retry), capped at `max_delay`
    pub fn calculate_delay(
        &self,
        attempt: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Duration {
        use rand::Rng;

        let delay = match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Linear => initial_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => initial_delay.saturating_mul(2u32.saturating_pow(attempt)),
            BackoffStrategy::ExponentialWithJitter => {
                let base = initial_delay.saturating_mul(2u32.saturating_pow(attempt));
                let jitter = (base.as_millis() as f64 * 0.1 * rand::thread_rng().gen::<f64>()) as u64;
                base.saturating_add(Duration::from_millis(jitter))
            }
        };

        delay.min(max_delay)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Exponential backoff, 3 attempts, 100ms initial delay
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Run exactly once
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO).with_max_attempts(1)
    }

    /// Set total attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, enable: bool) -> Self {
        self.strategy = match (enable, self.strategy) {
            (true, BackoffStrategy::Exponential) => BackoffStrategy::ExponentialWithJitter,
            (false, BackoffStrategy::ExponentialWithJitter) => BackoffStrategy::Exponential,
            (_, other) => other,
        };
        self
    }

    /// Delay before retry number `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.strategy
            .calculate_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts
    pub async fn execute<F, Fut, T, E, R>(&self, is_retryable: R, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let start = Instant::now();
        let mut attempt = 0u32;
        let mut total_delay = Duration::ZERO;

        loop {
            let result = operation(attempt + 1).await;
            let done = match &result {
                Ok(_) => true,
                Err(err) => attempt + 1 >= self.max_attempts || !is_retryable(err),
            };
            if done {
                return RetryResult {
                    result,
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                    total_retry_delay: total_delay,
                };
            }

            let delay = self.calculate_delay(attempt);
            tracing::debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying after failure");
            total_delay += delay;
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

/// Result of a retried operation with statistics
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// Final result (success or failure)
    pub result: Result<T, E>,
    /// Number of attempts made
    pub attempts: u32,
    /// Total duration including retries
    pub total_duration: Duration,
    /// Total time spent waiting between retries
    pub total_retry_delay: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Check if operation succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Check if any retries were performed
    pub fn had_retries(&self) -> bool {
        self.attempts > 1
    }

    /// Get the result
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_strategies() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(1);

        assert_eq!(BackoffStrategy::Fixed.calculate_delay(4, initial, max), initial);
        assert_eq!(
            BackoffStrategy::Linear.calculate_delay(2, initial, max),
            Duration::from_millis(300)
        );
        assert_eq!(
            BackoffStrategy::Exponential.calculate_delay(3, initial, max),
            Duration::from_millis(800)
        );
        assert_eq!(BackoffStrategy::Exponential.calculate_delay(10, initial, max), max);

        let jittered = BackoffStrategy::ExponentialWithJitter.calculate_delay(1, initial, max);
        assert!(jittered >= Duration::from_millis(200) && jittered <= Duration::from_millis(220));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let policy = RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(5);

        let outcome = policy
            .execute(
                |_: &&str| true,
                move |_| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("flaky")
                    } else {
                        Ok(42)
                    }
                },
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.had_retries());
        assert_eq!(outcome.into_result(), Ok(42));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(5);
        let outcome = policy
            .execute(|_: &&str| false, |_| async { Err::<(), _>("fatal") })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(2);
        let outcome = policy
            .execute(|_: &u32| true, |attempt| async move { Err::<(), _>(attempt) })
            .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.into_result(), Err(2));
    }
}
