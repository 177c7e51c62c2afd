// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry for fallible asynchronous operations
//!
//! Wraps a zero-argument async operation in a fixed attempt budget with
//! linearly growing delays between attempts. Callers get back both the value
//! and the number of attempts it took, or a typed failure carrying the error
//! from the final attempt.
//!
//! The executor holds no state across calls: concurrent retried operations
//! are fully independent, and the backoff is a task suspension, never a
//! thread-blocking sleep.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use retry::RetryPolicy;
//!
//! # async fn example() -> Result<(), retry::RetryError<std::io::Error>> {
//! let policy = RetryPolicy::new(3, Duration::from_secs(10));
//! let outcome = policy.run(|| async { fetch_quote().await }).await?;
//! println!("got quote in {} attempts", outcome.attempts);
//! # Ok(())
//! # }
//! # async fn fetch_quote() -> Result<u64, std::io::Error> { Ok(1) }
//! ```

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::sleep;

/// Attempt budget applied when callers do not specify one.
pub const DEFAULT_RETRIES: u32 = 3;

/// Base delay applied when callers do not specify one.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Failure modes of a retry sequence.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The retry parameters were rejected before any attempt was made.
    #[error("number of retries must be at least 1, got {retries}")]
    Configuration {
        /// The rejected attempt budget.
        retries: u32,
    },

    /// Every attempt failed and the budget is spent.
    #[error("maximum retries reached ({attempts}): {last_error}")]
    Exhausted {
        /// Number of attempts made, equal to the configured budget.
        attempts: u32,
        /// Error from the final attempt; earlier errors are discarded.
        last_error: E,
    },
}

/// Result of a retry sequence that eventually succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// Value produced by the successful attempt.
    pub value: T,
    /// 1-based ordinal of the attempt that succeeded.
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Discards the attempt count and keeps the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Attempt budget and backoff shape for one retried operation.
///
/// The delay before attempt `n + 1` is `base_delay * n`, so waits grow
/// linearly: with a 1 s base the sequence is 1 s, 2 s, 3 s and so on. A
/// policy is plain data; it can be stored in client structs and reused
/// across calls without sharing any retry state between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts; must be at least 1.
    pub retries: u32,
    /// Delay multiplied by the attempt ordinal between attempts.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with an explicit attempt budget and base delay.
    ///
    /// The budget is validated when [`run`](Self::run) is called, not here,
    /// so an invalid policy surfaces as a [`RetryError::Configuration`] from
    /// the call site that uses it.
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Attempts are sequential; between them the calling task suspends for
    /// `base_delay * attempt_number`. On success the outcome reports the
    /// 1-based attempt ordinal. On exhaustion the error carries the failure
    /// from the final attempt only.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.retries < 1 {
            return Err(RetryError::Configuration {
                retries: self.retries,
            });
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return Ok(RetryOutcome { value, attempts }),
                Err(error) => {
                    if attempts >= self.retries {
                        return Err(RetryError::Exhausted {
                            attempts,
                            last_error: error,
                        });
                    }
                    sleep(self.base_delay * attempts).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn first_try_success_reports_one_attempt() {
        let policy = RetryPolicy::default();
        let outcome = policy.run(|| async { Ok::<_, String>(42) }).await.unwrap();

        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success_counts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10));

        let seen = Arc::clone(&calls);
        let outcome = policy
            .run(move || {
                let seen = Arc::clone(&seen);
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "done");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_error_from_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let seen = Arc::clone(&calls);
        let error = policy
            .run(move || {
                let seen = Arc::clone(&seen);
                async move {
                    let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(format!("boom {attempt}"))
                }
            })
            .await
            .unwrap_err();

        match error {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "boom 3");
            }
            RetryError::Configuration { .. } => panic!("expected exhaustion"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_rejected_without_invoking_operation() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(0, Duration::from_millis(10));

        let seen = Arc::clone(&calls);
        let error = policy
            .run(move || {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(error, RetryError::Configuration { retries: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_with_attempt_number() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1000));
        let started = tokio::time::Instant::now();

        let result = policy.run(|| async { Err::<(), _>("down") }).await;

        assert!(result.is_err());
        // Waits of 1000, 2000 and 3000 ms separate the four attempts.
        assert_eq!(started.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sequences_suspend_independently() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1000));
        let started = tokio::time::Instant::now();

        let first_calls = Arc::new(AtomicU32::new(0));
        let second_calls = Arc::new(AtomicU32::new(0));

        let first_seen = Arc::clone(&first_calls);
        let first = policy.run(move || {
            let seen = Arc::clone(&first_seen);
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first down")
                } else {
                    Ok("first up")
                }
            }
        });
        let second_seen = Arc::clone(&second_calls);
        let second = policy.run(move || {
            let seen = Arc::clone(&second_seen);
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("second down")
                } else {
                    Ok("second up")
                }
            }
        });

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap().attempts, 2);
        assert_eq!(second.unwrap().attempts, 2);
        // Both backoffs overlap, so only one base delay elapses in total.
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn zero_base_delay_retries_immediately() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let seen = Arc::clone(&calls);
        let outcome = policy
            .run(move || {
                let seen = Arc::clone(&seen);
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("once".to_string())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn default_policy_uses_three_attempts_and_one_second() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.retries, DEFAULT_RETRIES);
        assert_eq!(policy.base_delay, DEFAULT_BASE_DELAY);
    }

    #[test]
    fn exhausted_display_includes_attempts_and_cause() {
        let error: RetryError<String> = RetryError::Exhausted {
            attempts: 3,
            last_error: "timeout".to_string(),
        };

        assert_eq!(error.to_string(), "maximum retries reached (3): timeout");
    }

    #[test]
    fn configuration_display_names_the_rejected_budget() {
        let error: RetryError<String> = RetryError::Configuration { retries: 0 };

        assert_eq!(
            error.to_string(),
            "number of retries must be at least 1, got 0"
        );
    }
}
