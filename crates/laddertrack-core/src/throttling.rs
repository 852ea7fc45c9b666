use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

/// Request quota imposed by a provider: `limit` requests per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateLimit {
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window_ms: 60_000,
        }
    }

    pub const fn per_second(limit: u32) -> Self {
        Self {
            limit,
            window_ms: 1_000,
        }
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared rate limiter gating physical attempts against one provider.
///
/// Callers wait for budget instead of failing, so a burst above the quota is
/// smoothed out rather than rejected.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
}

impl Throttle {
    pub fn new(rate_limit: RateLimit) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_for(rate_limit))),
        }
    }

    /// Take budget if available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait until the quota allows one more request.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

fn quota_for(rate_limit: RateLimit) -> Quota {
    let burst = NonZeroU32::new(rate_limit.limit).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_millis(rate_limit.window_ms);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_limited_to_quota() {
        let throttle = Throttle::new(RateLimit::per_minute(2));

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[test]
    fn zero_limit_still_allows_one_request() {
        let throttle = Throttle::new(RateLimit::per_minute(0));

        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[tokio::test]
    async fn acquire_waits_for_replenishment() {
        let throttle = Throttle::new(RateLimit {
            limit: 1,
            window_ms: 20,
        });
        throttle.acquire().await;

        let started = std::time::Instant::now();
        throttle.acquire().await;

        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
