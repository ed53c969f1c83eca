//! Retry policy with exponential backoff
//!
//! One policy object applied uniformly around execute + normalize:
//! - attempts bounded by `max_attempts` (default: 1, no retry)
//! - binary exponential delay capped at `max_delay_ms`
//! - optional ±25% jitter
//! - only error kinds listed in `retry_on` are retried

use crate::errors::{ErrorKind, Result, ToolError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Base delay for exponential backoff (1 second)
pub const BASE_DELAY_MS: u64 = 1000;

/// Maximum delay cap (16 seconds)
pub const MAX_DELAY_MS: u64 = 16000;

/// Retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    pub jitter: bool,

    /// Error kinds worth another attempt
    pub retry_on: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            jitter: true,
            retry_on: vec![ErrorKind::ExecutionFailed, ErrorKind::ExecutionTimeout],
        }
    }
}

/// Outcome of a retried operation plus how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create policy with custom attempts and base delay
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            ..Self::default()
        }
    }

    pub fn retry_on(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.retry_on = kinds;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ToolError::config("retry max_attempts must be at least 1"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ToolError::config(
                "retry max_delay_ms must not be below base_delay_ms",
            ));
        }
        Ok(())
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or attempts run out. The last error is returned unchanged.
    pub async fn execute_with_retry<F, Fut, T>(&self, label: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    if attempt >= max_attempts || !self.is_retryable(&e) {
                        return Attempted {
                            result: Err(e),
                            attempts: attempt,
                        };
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(
                        tool = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry number `retry` (0-based)
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry));
        let delay_ms = exponential.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            let jitter = (delay_ms / 4) as f64;
            let offset = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            (delay_ms as f64 + offset).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total time spent sleeping between attempts (no jitter)
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms = (0..self.max_attempts.saturating_sub(1))
            .map(|retry| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(retry))
                    .min(self.max_delay_ms)
            })
            .fold(0u64, u64::saturating_add);
        Duration::from_millis(total_ms)
    }

    pub fn is_retryable(&self, error: &ToolError) -> bool {
        self.retry_on.contains(&error.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn failing(tool: &str) -> ToolError {
        ToolError::ExecutionFailed {
            tool: tool.to_string(),
            exit_code: Some(1),
            stderr_excerpt: String::new(),
            partial: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = RetryPolicy::with_config(3, 1);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();

        let outcome = policy
            .execute_with_retry("t", move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Ok::<i32, ToolError>(42)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let policy = RetryPolicy::with_config(5, 1).without_jitter();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();

        let outcome = policy
            .execute_with_retry("t", move || {
                let count = count_clone.clone();
                async move {
                    let current = {
                        let mut attempts = count.lock().unwrap();
                        *attempts += 1;
                        *attempts
                    };
                    if current < 3 {
                        Err(failing("t"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_keeps_last_error() {
        let policy = RetryPolicy::with_config(3, 1).without_jitter();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();

        let outcome = policy
            .execute_with_retry("t", move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(failing("t"))
                }
            })
            .await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let policy = RetryPolicy::with_config(5, 1);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();

        let outcome = policy
            .execute_with_retry("t", move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(ToolError::config("bad timeout"))
                }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        let outcome = policy
            .execute_with_retry("t", || async { Err::<(), _>(failing("t")) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(policy.max_total_wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_calculate_delay() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay_ms: 1000,
            max_delay_ms: 16000,
            jitter: false,
            retry_on: vec![],
        };

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(16000));
        assert_eq!(policy.calculate_delay(40), Duration::from_millis(16000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy::with_config(3, 1000);
        for _ in 0..50 {
            let ms = policy.calculate_delay(0).as_millis();
            assert!((750..=1250).contains(&ms));
        }
    }

    #[test]
    fn test_max_total_wait_time() {
        let policy = RetryPolicy::with_config(6, 1000);
        // 1 + 2 + 4 + 8 + 16
        assert_eq!(policy.max_total_wait_time(), Duration::from_secs(31));
    }

    #[test]
    fn test_retry_on_selects_kinds() {
        let policy = RetryPolicy::default().retry_on(vec![ErrorKind::ToolUnavailable]);
        let unavailable = ToolError::ToolUnavailable {
            tool: "x".to_string(),
            host_check: String::new(),
            container_check: String::new(),
        };
        assert!(policy.is_retryable(&unavailable));
        assert!(!policy.is_retryable(&failing("x")));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::with_config(0, 10).validate().is_err());

        let inverted = RetryPolicy {
            base_delay_ms: 500,
            max_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert!(inverted.validate().is_err());
    }
}
