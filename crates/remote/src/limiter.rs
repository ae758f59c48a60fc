use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = Governor<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Process-wide request-rate gate.
///
/// Every request to the remote source (document fetches and asset downloads
/// alike) acquires one token first, so the aggregate rate stays under budget
/// however many operations are running at once. Share it behind an [`Arc`](std::sync::Arc).
pub struct RateLimiter {
    inner: DirectLimiter,
    per_second: f64,
}

impl RateLimiter {
    /// Sustained rate used when nothing else is configured.
    pub const DEFAULT_PER_SECOND: f64 = 3.0;

    /// Allow `per_second` requests per second (fractional rates are fine),
    /// with up to `burst` requests let through back-to-back. A burst of zero
    /// is treated as one.
    pub fn new(per_second: f64, burst: u32) -> Result<Self> {
        if !per_second.is_finite() || per_second <= 0.0 {
            exn::bail!(ErrorKind::InvalidRate(format!("{per_second} requests per second")));
        }
        let period = Duration::try_from_secs_f64(per_second.recip())
            .or_raise(|| ErrorKind::InvalidRate(format!("{per_second} requests per second")))?;
        let quota = Quota::with_period(period)
            .ok_or_raise(|| ErrorKind::InvalidRate(format!("{per_second} requests per second")))?
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));
        Ok(Self { inner: Governor::direct(quota), per_second })
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Take a token if one becomes available within `timeout`; `false`
    /// otherwise.
    pub async fn try_acquire(&self, timeout: Duration) -> bool {
        if self.inner.check().is_ok() {
            return true;
        }
        tokio::time::timeout(timeout, self.inner.until_ready()).await.is_ok()
    }

    pub fn per_second(&self) -> f64 {
        self.per_second
    }
}
impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("per_second", &self.per_second).finish_non_exhaustive()
    }
}
impl Default for RateLimiter {
    fn default() -> Self {
        let quota = Quota::with_period(Duration::from_millis(333)).unwrap_or(Quota::per_second(NonZeroU32::MIN));
        Self { inner: Governor::direct(quota), per_second: Self::DEFAULT_PER_SECOND }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Instant;

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_rejects_invalid_rates(#[case] rate: f64) {
        let err = RateLimiter::new(rate, 1).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRate(_)));
    }

    #[test]
    fn test_debug_shows_the_rate() {
        let limiter = RateLimiter::new(2.5, 1).unwrap();
        assert_eq!(format!("{limiter:?}"), "RateLimiter { per_second: 2.5, .. }");
    }

    #[tokio::test]
    async fn test_try_acquire_times_out_when_exhausted() {
        let limiter = RateLimiter::new(0.5, 1).unwrap();
        assert!(limiter.try_acquire(Duration::ZERO).await);
        assert!(!limiter.try_acquire(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_acquire_spaces_requests_at_the_configured_rate() {
        let limiter = RateLimiter::new(20.0, 1).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // First token is immediate, the next two wait 50ms each.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_burst_lets_requests_through_back_to_back() {
        let limiter = RateLimiter::new(1.0, 5).unwrap();
        for _ in 0..5 {
            assert!(limiter.try_acquire(Duration::ZERO).await);
        }
        assert!(!limiter.try_acquire(Duration::ZERO).await);
    }
}
