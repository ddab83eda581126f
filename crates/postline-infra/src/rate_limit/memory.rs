//! In-memory fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use postline_core::ports::{Clock, RateLimitError, RateLimitResult, RateLimiter, SystemClock};

use super::store::{RateLimitStore, WindowPolicy, WindowRule};

/// Longest accepted window.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// In-memory rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    pub policy: WindowPolicy,
    /// Prefix prepended to every key, empty for none.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
            policy: WindowPolicy::ResetAnchored,
            key_prefix: "rate-limit".to_string(),
        }
    }
}

impl RateLimitConfig {
    /// Load the request limiter configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_requests),
            window: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
            ..defaults
        }
    }

    fn validate(&self) -> Result<(), RateLimitError> {
        if self.max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests must be positive".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(RateLimitError::InvalidConfig(format!(
                "window must not exceed {} seconds",
                MAX_WINDOW.as_secs()
            )));
        }
        Ok(())
    }

    fn rule(&self) -> WindowRule {
        WindowRule {
            limit: self.max_requests,
            window: self.window,
            policy: self.policy,
        }
    }
}

/// Fixed-window rate limiter over a shared [`RateLimitStore`].
///
/// The store is injected so that its lifetime is owned by whoever builds the
/// limiter (application state in the server, a fresh store per test).
/// Note: Limits are per-process, not distributed across instances.
pub struct FixedWindowRateLimiter {
    store: Arc<RateLimitStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl FixedWindowRateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<RateLimitStore>) -> Result<Self, RateLimitError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: RateLimitConfig,
        store: Arc<RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock,
        })
    }

    pub fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RateLimitConfig::from_env(), Arc::new(RateLimitStore::new()))
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RateLimitStore> {
        &self.store
    }

    fn make_key(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    /// Count a request for `key` against the current window.
    pub fn check_now(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        if key.is_empty() {
            return Err(RateLimitError::InvalidKey);
        }

        let store_key = self.make_key(key);
        let now = self.clock.now_millis();
        let result = self
            .store
            .check_and_record(&store_key, now, &self.config.rule());

        tracing::debug!(
            key = %store_key,
            count = result.count,
            limit = result.limit,
            allowed = result.allowed,
            "Rate limit checked"
        );

        Ok(result)
    }

    /// Drop every window that has expired. Returns the number of removed entries.
    pub fn sweep_expired(&self) -> usize {
        let removed = self
            .store
            .sweep_expired(self.clock.now_millis(), &self.config.rule());
        tracing::debug!(removed, remaining = self.store.len(), "Rate limit store swept");
        removed
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        self.check_now(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postline_core::ports::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    fn limiter(clock: Arc<ManualClock>) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::with_clock(
            RateLimitConfig::default(),
            Arc::new(RateLimitStore::new()),
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_six_requests_from_one_identifier() {
        let limiter = limiter(Arc::new(ManualClock::new(T0)));

        for expected_remaining in [4, 3, 2, 1, 0] {
            let res = limiter.check("1.2.3.4").await.unwrap();
            assert!(res.allowed);
            assert_eq!(res.remaining, expected_remaining);
            assert_eq!(res.limit, 5);
        }

        let res = limiter.check("1.2.3.4").await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.remaining, 0);
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let limiter = limiter(Arc::new(ManualClock::new(T0)));
        limiter.check("unknown").await.unwrap();

        assert!(limiter.store().get("rate-limit:unknown").is_some());
        assert!(limiter.store().get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_empty_key_is_an_error() {
        let limiter = limiter(Arc::new(ManualClock::new(T0)));
        assert_eq!(
            limiter.check("").await.unwrap_err(),
            RateLimitError::InvalidKey
        );
    }

    #[tokio::test]
    async fn test_new_window_after_clock_advance() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = limiter(clock.clone());

        for _ in 0..6 {
            limiter.check("1.2.3.4").await.unwrap();
        }
        clock.advance(Duration::from_millis(60_001));

        let res = limiter.check("1.2.3.4").await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.count, 1);
    }

    #[test]
    fn test_sweep_uses_clock() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = limiter(clock.clone());

        limiter.check_now("a").unwrap();
        assert_eq!(limiter.sweep_expired(), 0);

        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.sweep_expired(), 1);
        assert!(limiter.store().is_empty());
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let config = RateLimitConfig {
            max_requests: 0,
            ..RateLimitConfig::default()
        };
        let err = FixedWindowRateLimiter::new(config, Arc::new(RateLimitStore::new()))
            .err()
            .unwrap();
        assert!(matches!(err, RateLimitError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let config = RateLimitConfig {
            window: Duration::ZERO,
            ..RateLimitConfig::default()
        };
        assert!(FixedWindowRateLimiter::new(config, Arc::new(RateLimitStore::new())).is_err());
    }

    #[test]
    fn test_window_beyond_maximum_is_rejected() {
        for window in [
            MAX_WINDOW + Duration::from_secs(1),
            Duration::from_millis(i64::MAX as u64),
            Duration::from_secs(u64::MAX / 1000 * 2),
        ] {
            let config = RateLimitConfig {
                window,
                ..RateLimitConfig::default()
            };
            let err = FixedWindowRateLimiter::new(config, Arc::new(RateLimitStore::new()))
                .err()
                .unwrap();
            assert!(matches!(err, RateLimitError::InvalidConfig(_)));
        }
    }

    #[test]
    fn test_maximum_window_still_limits() {
        let config = RateLimitConfig {
            max_requests: 1,
            window: MAX_WINDOW,
            ..RateLimitConfig::default()
        };
        let limiter = FixedWindowRateLimiter::with_clock(
            config,
            Arc::new(RateLimitStore::new()),
            Arc::new(ManualClock::new(T0)),
        )
        .unwrap();

        assert!(limiter.check_now("a").unwrap().allowed);
        assert!(!limiter.check_now("a").unwrap().allowed);
    }
}
