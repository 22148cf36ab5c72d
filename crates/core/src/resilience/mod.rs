pub mod breaker;
pub mod error;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use error::{
    is_transient, CircuitOpenError, HttpStatusError, RetryExhaustedError, TimeoutError,
};

use std::future::Future;
use std::time::Duration;

/// Race `operation` against a timer. The operation future is dropped when
/// the timer wins, so anything holding a reqwest request in flight is
/// aborted with it.
pub async fn with_timeout<T, F>(operation: F, timeout: Duration, label: &str) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(TimeoutError {
            label: label.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
        .into()),
    }
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryOptions {
    /// Delay inserted before attempt `n` (1-based). Attempt 1 runs
    /// immediately; attempt n waits min(base * multiplier^(n-2), max).
    /// Deterministic on purpose: no jitter, so prompts and tests see the
    /// same schedule every run.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi((attempt - 2) as i32);
        let seconds =
            (self.base_delay.as_secs_f64() * factor).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }
}

/// Invoke `operation` up to `max_retries + 1` times, strictly sequentially.
///
/// `retry_condition` gates every retry; a false verdict propagates the
/// original error unwrapped. `on_retry` runs before each backoff delay; it
/// is observability only and its failures never alter the retry outcome.
/// Exhaustion fails with `RetryExhaustedError` carrying the last error.
pub async fn with_retry<T, F, Fut, C, H>(
    mut operation: F,
    options: &RetryOptions,
    retry_condition: C,
    mut on_retry: H,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    C: Fn(&anyhow::Error) -> bool,
    H: FnMut(&anyhow::Error, u32) -> anyhow::Result<()>,
{
    let max_attempts = options.max_retries + 1;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retry_condition(&err) {
                    return Err(err);
                }
                if attempt >= max_attempts {
                    return Err(RetryExhaustedError {
                        attempts: attempt,
                        last_error: err,
                    }
                    .into());
                }
                if let Err(hook_err) = on_retry(&err, attempt) {
                    tracing::warn!(attempt, error = %hook_err, "retry hook failed; ignoring");
                }
                let backoff = options.delay_before_attempt(attempt + 1);
                tracing::warn!(attempt, ?backoff, error = %err, "attempt failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// No-op retry hook for call sites with nothing extra to record.
pub fn no_retry_hook(_err: &anyhow::Error, _attempt: u32) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_delays_follow_capped_exponential() {
        let options = RetryOptions {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 3.0,
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(options.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(options.delay_before_attempt(2), Duration::from_millis(100));
        assert_eq!(options.delay_before_attempt(3), Duration::from_millis(300));
        // 100 * 3^2 = 900, capped at 500.
        assert_eq!(options.delay_before_attempt(4), Duration::from_millis(500));
        assert_eq!(options.delay_before_attempt(5), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_runs_exactly_max_retries_plus_one_attempts() {
        let attempts = AtomicU32::new(0);
        let options = RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        };

        let res: anyhow::Result<()> = with_retry(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("still down"))
            },
            &options,
            |_| true,
            no_retry_hook,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let err = res.unwrap_err();
        let exhausted = err.downcast_ref::<RetryExhaustedError>().unwrap();
        assert_eq!(exhausted.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_propagates_unwrapped_after_one_attempt() {
        let attempts = AtomicU32::new(0);

        let res: anyhow::Result<()> = with_retry(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("bad request"))
            },
            &RetryOptions::default(),
            |_| false,
            no_retry_hook,
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let err = res.unwrap_err();
        assert!(err.downcast_ref::<RetryExhaustedError>().is_none());
        assert_eq!(format!("{err}"), "bad request");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_midway_without_further_attempts() {
        let attempts = AtomicU32::new(0);

        let res = with_retry(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(anyhow::anyhow!("flaky"))
                } else {
                    Ok(n)
                }
            },
            &RetryOptions::default(),
            |_| true,
            no_retry_hook,
        )
        .await
        .unwrap();

        assert_eq!(res, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_retry_hook_does_not_change_outcome() {
        let hook_calls = AtomicU32::new(0);

        let res = with_retry(
            || async {
                if hook_calls.load(Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("first try down"))
                } else {
                    Ok("recovered")
                }
            },
            &RetryOptions::default(),
            |_| true,
            |_, _| {
                hook_calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("metrics sink unavailable"))
            },
        )
        .await
        .unwrap();

        assert_eq!(res, "recovered");
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_produces_typed_error_with_label() {
        let res: anyhow::Result<()> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            Duration::from_millis(250),
            "slow-quote",
        )
        .await;

        let err = res.unwrap_err();
        let timeout = err.downcast_ref::<TimeoutError>().unwrap();
        assert_eq!(timeout.label, "slow-quote");
        assert_eq!(timeout.timeout_ms, 250);
    }
}
