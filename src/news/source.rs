//! The news source capability set and its per-source rate limiter: a
//! `parking_lot`-guarded token bucket refilled lazily on each check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RawArticle {
    pub headline: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content_snippet: String,
}

/// Declared rate budget for a source: `capacity` tokens, refilled at
/// `refill_per_sec` tokens/second, capped at `capacity`.
#[derive(Debug, Clone, Copy)]
pub struct RateSpec {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl RateSpec {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self { capacity, refill_per_sec }
    }
}

/// Token-bucket limiter sized from a source's declared `RateSpec`.
pub struct TokenBucket {
    spec: RateSpec,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(spec: RateSpec) -> Self {
        Self {
            spec,
            state: Mutex::new(BucketState {
                tokens: spec.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.spec.refill_per_sec).min(self.spec.capacity);
        state.last_refill = Instant::now();
    }

    /// Take one token if available; returns `false` (no blocking) otherwise.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Block until a token is available. Bounded by the caller's own deadline;
    /// this never loops longer than one refill period at a time.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = Duration::from_secs_f64((1.0 / self.spec.refill_per_sec).max(0.01));
            tokio::time::sleep(wait).await;
        }
    }
}

/// Capability set a concrete news source implements.
/// Adding a source requires only a new implementation of this trait.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &str;
    fn source_tier(&self) -> u8;
    fn rate_limit(&self) -> RateSpec;
    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>, crate::CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_denies_once_exhausted_then_refills() {
        let bucket = TokenBucket::new(RateSpec::new(2.0, 1000.0));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.try_acquire());
    }
}
