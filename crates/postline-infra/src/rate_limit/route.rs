//! Stateful limiter guarding a single operation.

use std::sync::Arc;
use std::time::Duration;

use postline_core::ports::{Clock, RateLimitError, SystemClock};

use super::memory::{FixedWindowRateLimiter, RateLimitConfig};
use super::store::{RateLimitStore, WindowPolicy};

/// Rate limiter owning a private store, meant to be checked inside one
/// handler rather than as cross-cutting middleware.
///
/// Exactly `max_requests` calls are admitted per window, measured from the
/// first call. The store is never swept automatically.
pub struct RouteRateLimiter {
    inner: FixedWindowRateLimiter,
}

impl RouteRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Result<Self, RateLimitError> {
        Self::with_clock(window, max_requests, Arc::new(SystemClock))
    }

    pub fn with_clock(
        window: Duration,
        max_requests: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        let config = RateLimitConfig {
            max_requests,
            window,
            policy: WindowPolicy::FirstRequestAnchored,
            key_prefix: String::new(),
        };
        let inner = FixedWindowRateLimiter::with_clock(config, Arc::new(RateLimitStore::new()), clock)?;
        Ok(Self { inner })
    }

    /// Admit a call for `key`, or fail with [`RateLimitError::Exceeded`].
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let result = self.inner.check_now(key)?;
        if result.allowed {
            return Ok(());
        }

        // A rejection on the closing millisecond of the window still waits.
        let retry_after_secs = result.retry_after_secs().max(1);
        tracing::warn!(key = %key, retry_after_secs, "Route rate limit exceeded");
        Err(RateLimitError::Exceeded { retry_after_secs })
    }

    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.store().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postline_core::ports::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_sixth_call_is_rejected_with_wait_time() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RouteRateLimiter::with_clock(Duration::from_millis(60_000), 5, clock.clone()).unwrap();

        for _ in 0..5 {
            limiter.check("demo").unwrap();
        }

        clock.advance(Duration::from_millis(2_500));
        let err = limiter.check("demo").unwrap_err();

        assert_eq!(err, RateLimitError::Exceeded { retry_after_secs: 58 });
        let message = err.to_string();
        assert!(message.starts_with("Rate limit exceeded. Please try again in "));
        assert!(message.ends_with(" seconds."));
    }

    #[test]
    fn test_wait_time_is_within_window() {
        let limiter = RouteRateLimiter::new(Duration::from_secs(60), 5).unwrap();
        for _ in 0..5 {
            limiter.check("demo").unwrap();
        }

        match limiter.check("demo") {
            Err(RateLimitError::Exceeded { retry_after_secs }) => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_admits_again_after_window() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RouteRateLimiter::with_clock(Duration::from_secs(60), 1, clock.clone()).unwrap();

        limiter.check("unknown").unwrap();
        assert!(limiter.check("unknown").is_err());

        clock.advance(Duration::from_millis(60_001));
        assert!(limiter.check("unknown").is_ok());
    }

    #[test]
    fn test_limiters_do_not_share_state() {
        let first = RouteRateLimiter::new(Duration::from_secs(60), 1).unwrap();
        let second = RouteRateLimiter::new(Duration::from_secs(60), 1).unwrap();

        first.check("demo").unwrap();
        assert!(second.check("demo").is_ok());
        assert_eq!(first.tracked_keys(), 1);
    }

    #[test]
    fn test_errors_propagate() {
        let limiter = RouteRateLimiter::new(Duration::from_secs(60), 5).unwrap();
        assert_eq!(limiter.check(""), Err(RateLimitError::InvalidKey));
    }

    #[test]
    fn test_rejection_at_window_boundary_waits_one_second() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RouteRateLimiter::with_clock(Duration::from_secs(60), 5, clock.clone()).unwrap();
        for _ in 0..5 {
            limiter.check("demo").unwrap();
        }

        clock.advance(Duration::from_millis(60_000));
        let err = limiter.check("demo").unwrap_err();
        assert_eq!(err, RateLimitError::Exceeded { retry_after_secs: 1 });
        assert_eq!(err.to_string(), "Rate limit exceeded. Please try again in 1 seconds.");

        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("demo").is_ok());
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        assert!(matches!(
            RouteRateLimiter::new(Duration::from_millis(i64::MAX as u64), 5),
            Err(RateLimitError::InvalidConfig(_))
        ));
        assert!(matches!(
            RouteRateLimiter::new(Duration::from_secs(u64::MAX / 1000 * 2), 1),
            Err(RateLimitError::InvalidConfig(_))
        ));
    }
}
