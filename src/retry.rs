//! Retry-with-backoff helper shared by collaborator calls and source fetches.
//! Mission: exponential backoff, base 500ms, factor 2, jitter ±25%.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.25,
            max_retries: 2,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the `attempt`-th retry (0-indexed), with ±jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter_span = raw * self.jitter;
        let jittered = rand::thread_rng().gen_range((raw - jitter_span)..=(raw + jitter_span));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Run `op` up to `policy.max_retries` additional times after an initial attempt,
/// sleeping a jittered exponential backoff between attempts. Returns the last error
/// if every attempt failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_within_jitter_band() {
        let policy = BackoffPolicy::default();
        let d0 = policy.delay_for(0).as_secs_f64();
        let d1 = policy.delay_for(1).as_secs_f64();
        assert!(d0 >= 0.375 && d0 <= 0.625); // 500ms ± 25%
        assert!(d1 >= 0.75 && d1 <= 1.25); // 1000ms ± 25%
    }

    #[tokio::test]
    async fn retries_until_success_then_stops() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            ..BackoffPolicy::default()
        };
        let result: Result<u32, &'static str> = retry_with_backoff(policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            max_retries: 2,
            ..BackoffPolicy::default()
        };
        let result: Result<u32, &'static str> =
            retry_with_backoff(policy, "test", || async { Err("always fails") }).await;
        assert_eq!(result, Err("always fails"));
    }
}
