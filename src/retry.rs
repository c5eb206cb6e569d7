//! Reusable retry-with-backoff policy.
//!
//! One policy object is shared by every fallible remote call instead of
//! duplicating the loop at each call site. Delays double per attempt with
//! uniform random jitter, capped at `max_delay`. Callers classify each
//! failure as transient (retried) or permanent (returned immediately).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Outcome of a single attempt, as classified by the caller.
pub enum Attempt<T, E> {
    Ok(T),
    /// Worth retrying: rate limit, server error, network failure.
    Transient(E),
    /// Not worth retrying: client error, invalid response shape.
    Permanent(E),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Backoff before retry number `retry` (1-based): `base * 2^(retry-1)`
    /// capped at `max_delay`, plus up to one `base_delay` of jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter = self.base_delay.mul_f64(rand::rng().random_range(0.0..1.0));
        capped + jitter
    }

    /// Drive `op` until it succeeds, fails permanently, or the attempt
    /// budget is exhausted (the last transient error is returned).
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        E: std::fmt::Display,
    {
        let mut retries = 0u32;
        loop {
            match op().await {
                Attempt::Ok(value) => return Ok(value),
                Attempt::Permanent(err) => return Err(err),
                Attempt::Transient(err) => {
                    retries += 1;
                    if retries >= self.max_attempts.max(1) {
                        return Err(err);
                    }
                    let delay = self.delay_for(retries);
                    tracing::warn!(
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let policy = fast_policy(3);
        let result: Result<u32, String> = policy.run(|| async { Attempt::Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Attempt::Transient("not yet".to_string())
                    } else {
                        Attempt::Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Transient("still down".to_string()) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let policy = fast_policy(5);
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Permanent("bad request".to_string()) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "bad request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(4));
        // Jitter adds at most one base_delay on top of the capped exponential.
        assert!(policy.delay_for(1) >= Duration::from_secs(1));
        assert!(policy.delay_for(1) <= Duration::from_secs(2));
        assert!(policy.delay_for(2) >= Duration::from_secs(2));
        assert!(policy.delay_for(10) <= Duration::from_secs(5));
    }
}
