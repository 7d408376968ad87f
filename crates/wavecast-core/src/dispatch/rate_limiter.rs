//! Global send-rate limiter
//!
//! One token bucket shared by every send worker across all executing
//! campaigns. The limit protects the single gateway credential, so it is
//! global rather than per-campaign.

use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Token bucket over a messages-per-second budget
pub struct RateLimiter {
    rate_per_second: u32,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter with the given sustained rate. The burst capacity
    /// equals one second of budget.
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            rate_per_second: rate_per_second.max(1),
            state: Mutex::new(BucketState {
                tokens: rate_per_second.max(1) as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for a refill if the bucket is empty
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                None => return,
                Some(wait) => sleep(wait).await,
            }
        }
    }

    /// Returns `None` when a token was taken, otherwise the time until
    /// the next token becomes available.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let rate = self.rate_per_second as f64;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(rate);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - state.tokens) / rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_rate() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_take().is_none());
        }
        assert!(limiter.try_take().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let limiter = RateLimiter::new(10);
        for _ in 0..10 {
            assert!(limiter.try_take().is_none());
        }
        assert!(limiter.try_take().is_some());

        // 100ms at 10/s refills one token
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.try_take().is_none());
        assert!(limiter.try_take().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_token() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // At 2/s the third token takes about half a second
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_never_exceeds_capacity() {
        let limiter = RateLimiter::new(3);
        tokio::time::advance(Duration::from_secs(60)).await;

        for _ in 0..3 {
            assert!(limiter.try_take().is_none());
        }
        assert!(limiter.try_take().is_some());
    }
}
