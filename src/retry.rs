//! Bounded retries with exponential backoff around remote calls.
//!
//! Only [`EvalError::TransientRemote`] failures are retried. Anything else
//! (bad credentials, malformed requests, parse errors) is returned after the
//! first attempt. The backoff state lives in each call, so concurrent
//! callers never share a timer.

use crate::config::RetryConfig;
use crate::error::{EvalError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try a remote call and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Extra random delay as a fraction of the nominal delay (0.1 = up to 10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Nominal delay after the `failed_attempt`-th failure:
    /// `base_delay * 2^(failed_attempt - 1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// Exhausting the budget yields [`EvalError::RetryExhausted`] wrapping
    /// the last transient error.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = Backoff::new(self);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(
                            operation = operation_name,
                            error = %e,
                            attempts = attempt,
                            "retries exhausted"
                        );
                        return Err(EvalError::RetryExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        operation = operation_name,
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Per-call backoff schedule.
///
/// Delays never decrease from one retry to the next, even with jitter.
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
    last: Duration,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            last: Duration::ZERO,
        }
    }

    /// Delay to wait after the next failure.
    pub fn next_delay(&mut self) -> Duration {
        self.failures += 1;
        let nominal = self.policy.backoff_delay(self.failures);
        let delay = (nominal + jitter(nominal, self.policy.jitter))
            .min(self.policy.max_delay)
            .max(self.last);
        self.last = delay;
        delay
    }
}

fn jitter(nominal: Duration, fraction: f64) -> Duration {
    let span_ms = (nominal.as_millis() as f64 * fraction.max(0.0)).round() as u64;
    if span_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=span_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1)).with_jitter(0.0)
    }

    /// Fails transiently `failures` times, then returns the attempt number.
    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(EvalError::TransientRemote(format!("HTTP 429 on call {}", n)))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(4);

        let value = policy.execute("flaky", || flaky(&calls, 3)).await.unwrap();

        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausts_when_budget_too_small() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(3);

        let err = policy.execute("flaky", || flaky(&calls, 3)).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            EvalError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("call 3"));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(5);

        let result: Result<()> = tokio_test::block_on(policy.execute("auth", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EvalError::PermanentRemote("HTTP 401: invalid key".to_string())) }
        }));

        assert!(matches!(result, Err(EvalError::PermanentRemote(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(0);

        let value = tokio_test::block_on(policy.execute("once", || flaky(&calls, 0))).unwrap();

        assert_eq!(value, 1);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(700));

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(700));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(700));
    }

    #[test]
    fn test_jittered_delays_never_decrease() {
        let policy = RetryPolicy::new(20, Duration::from_millis(50))
            .with_max_delay(Duration::from_millis(1_000))
            .with_jitter(0.5);

        for _ in 0..50 {
            let mut backoff = Backoff::new(&policy);
            let mut previous = Duration::ZERO;
            for _ in 0..12 {
                let delay = backoff.next_delay();
                assert!(delay >= previous);
                assert!(delay <= policy.max_delay);
                previous = delay;
            }
        }
    }
}
