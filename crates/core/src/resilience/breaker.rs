use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::error::{CircuitOpenError, TimeoutError};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive wrapped-operation failures before the circuit opens.
    pub failure_threshold: u32,

    /// How long the circuit stays open before one trial call is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BreakerCounters {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
}

/// Point-in-time view of one breaker, loggable as structured JSON when a
/// pipeline run fails.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub counters: BreakerCounters,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    counters: BreakerCounters,
}

/// Fault isolation for one named external dependency. One instance per
/// dependency for the lifetime of the process, mutated only through
/// `execute`; state is in-memory only and does not survive restarts.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                counters: BreakerCounters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            counters: inner.counters.clone(),
        }
    }

    /// Run `operation` under the breaker. While open, fails immediately with
    /// `CircuitOpenError` without constructing the operation future.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.admit()?;
        let result = operation().await;
        self.record(&result);
        result
    }

    fn admit(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.counters.requests += 1;

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(
                        breaker = %self.name,
                        "recovery timeout elapsed; allowing trial call"
                    );
                    Ok(())
                } else {
                    inner.counters.failures += 1;
                    Err(CircuitOpenError {
                        name: self.name.clone(),
                    })
                }
            }
            BreakerState::HalfOpen => {
                // Exactly one trial call at a time.
                if inner.trial_in_flight {
                    inner.counters.failures += 1;
                    Err(CircuitOpenError {
                        name: self.name.clone(),
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record<T>(&self, result: &anyhow::Result<T>) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match result {
            Ok(_) => {
                inner.counters.successes += 1;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                if inner.state != BreakerState::Closed {
                    tracing::info!(breaker = %self.name, "trial call succeeded; closing circuit");
                }
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
            }
            Err(err) => {
                inner.counters.failures += 1;
                if err.downcast_ref::<TimeoutError>().is_some() {
                    inner.counters.timeouts += 1;
                }
                inner.trial_in_flight = false;
                match inner.state {
                    BreakerState::HalfOpen => {
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                        tracing::warn!(breaker = %self.name, "trial call failed; reopening circuit");
                    }
                    BreakerState::Closed => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            inner.state = BreakerState::Open;
                            inner.opened_at = Some(Instant::now());
                            tracing::warn!(
                                breaker = %self.name,
                                consecutive_failures = inner.consecutive_failures,
                                "failure threshold reached; opening circuit"
                            );
                        }
                    }
                    BreakerState::Open => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) {
        let res: anyhow::Result<()> = breaker
            .execute(|| async { Err(anyhow::anyhow!("boom")) })
            .await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_fails_fast() {
        let breaker = test_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        // While open, the wrapped operation must not be invoked.
        let invoked = AtomicU32::new(0);
        let res: anyhow::Result<()> = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        let err = res.unwrap_err();
        assert!(err.downcast_ref::<CircuitOpenError>().is_some());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_half_open_on_success() {
        let breaker = test_breaker(2, Duration::from_secs(30));
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        // First call after the timeout is the half-open trial.
        let res: anyhow::Result<u32> = breaker.execute(|| async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_and_resets_recovery_timer() {
        let breaker = test_breaker(1, Duration::from_secs(10));
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        // Half the new recovery window: still failing fast.
        tokio::time::advance(Duration::from_secs(5)).await;
        let res: anyhow::Result<()> = breaker.execute(|| async { Ok(()) }).await;
        assert!(res.unwrap_err().downcast_ref::<CircuitOpenError>().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn counters_track_every_call() {
        let breaker = test_breaker(1, Duration::from_secs(60));
        fail(&breaker).await;

        // Fast-fail while open still counts the request.
        let _: anyhow::Result<()> = breaker.execute(|| async { Ok(()) }).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.counters.requests, 2);
        assert_eq!(snapshot.counters.successes, 0);
        assert_eq!(snapshot.counters.failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_counted_separately() {
        let breaker = test_breaker(5, Duration::from_secs(60));
        let res: anyhow::Result<()> = breaker
            .execute(|| async {
                Err(TimeoutError {
                    label: "quote".to_string(),
                    timeout_ms: 100,
                }
                .into())
            })
            .await;
        assert!(res.is_err());

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.counters.failures, 1);
        assert_eq!(snapshot.counters.timeouts, 1);
    }
}
