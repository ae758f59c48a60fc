use crate::error::{ErrorKind, Result};
use crate::limiter::RateLimiter;
use exn::ResultExt;
use std::future::Future;
use std::time::Duration;

/// `base * 2^exponent`, saturating instead of overflowing.
pub fn exponential(base: Duration, exponent: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(exponent))
}

/// Exponential backoff applied to rate-limit rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Wait before the first retry.
    pub min: Duration,
    /// Upper bound on any single wait.
    pub max: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}
impl Backoff {
    /// Wait before retry number `retry` (zero-based): `min * 2^retry`,
    /// capped at `max`.
    pub fn delay(&self, retry: u32) -> Duration {
        exponential(self.min, retry).min(self.max)
    }
}
impl Default for Backoff {
    fn default() -> Self {
        Self { min: Duration::from_secs(5), max: Duration::from_secs(120), max_retries: 6 }
    }
}

/// Run `call` through the rate gate, retrying rate-limit rejections.
///
/// Every attempt (including retries) acquires a token from `limiter` first.
/// Any error other than [`ErrorKind::RateLimited`] is returned untouched after
/// the first attempt.
pub(crate) async fn with_backoff<T, F, Fut>(
    limiter: &RateLimiter,
    backoff: &Backoff,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        limiter.acquire().await;
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };
        if retry >= backoff.max_retries {
            tracing::error!(operation, attempts = retry + 1, "Giving up after repeated rate limiting");
            return Err(err).or_raise(|| ErrorKind::RetriesExhausted(retry + 1));
        }
        let delay = backoff.delay(retry).max(err.retry_after().unwrap_or_default()).min(backoff.max);
        tracing::warn!(
            operation,
            retry = retry + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Rate limited, backing off"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
