//! Rate limiting port.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if a request is allowed and update the counter.
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Configured maximum requests per window.
    pub limit: u32,
    /// Requests counted in the current window, after this check.
    pub count: u32,
    pub remaining: u32,
    /// Instant the current window expires, in epoch milliseconds.
    pub reset_at: i64,
    pub retry_after: Duration,
}

impl RateLimitResult {
    /// Window reset instant in whole epoch seconds (floored).
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at.div_euclid(1000)
    }

    /// Seconds the client should wait before retrying (rounded up).
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.retry_after.as_millis() as u64;
        millis.div_ceil(1000)
    }
}

/// What a caller does when the limiter itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnInternalError {
    /// Log the failure and let the request through unlimited.
    #[default]
    FailOpen,
    /// Surface the failure to the caller.
    Propagate,
}

impl FromStr for OnInternalError {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(Self::FailOpen),
            "propagate" | "fail-closed" | "closed" => Ok(Self::Propagate),
            other => Err(RateLimitError::InvalidConfig(format!(
                "unknown internal error policy '{}'",
                other
            ))),
        }
    }
}

/// Rate limit errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded. Please try again in {retry_after_secs} seconds.")]
    Exceeded { retry_after_secs: u64 },

    #[error("Rate limit key must not be empty")]
    InvalidKey,

    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(reset_at: i64, retry_after: Duration) -> RateLimitResult {
        RateLimitResult {
            allowed: true,
            limit: 5,
            count: 1,
            remaining: 4,
            reset_at,
            retry_after,
        }
    }

    #[test]
    fn test_reset_at_secs_floors() {
        assert_eq!(result(1_700_000_000_999, Duration::ZERO).reset_at_secs(), 1_700_000_000);
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        assert_eq!(result(0, Duration::from_millis(59_001)).retry_after_secs(), 60);
        assert_eq!(result(0, Duration::from_millis(60_000)).retry_after_secs(), 60);
        assert_eq!(result(0, Duration::ZERO).retry_after_secs(), 0);
    }

    #[test]
    fn test_exceeded_message() {
        let err = RateLimitError::Exceeded {
            retry_after_secs: 42,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. Please try again in 42 seconds."
        );
    }

    #[test]
    fn test_parse_internal_error_policy() {
        assert_eq!(
            "fail-open".parse::<OnInternalError>(),
            Ok(OnInternalError::FailOpen)
        );
        assert_eq!(
            "Propagate".parse::<OnInternalError>(),
            Ok(OnInternalError::Propagate)
        );
        assert!("sometimes".parse::<OnInternalError>().is_err());
    }
}
