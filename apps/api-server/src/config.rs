//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use postline_core::ports::OnInternalError;
use postline_infra::{DatabaseConfig, RateLimitConfig, WindowPolicy};

use crate::background::SchedulerConfig;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Settings of the rate limiting middleware.
#[derive(Debug, Clone)]
pub struct RequestLimitConfig {
    pub limiter: RateLimitConfig,
    pub on_internal_error: OnInternalError,
    /// How often expired windows are swept from the shared store.
    pub sweep_interval: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub database: Option<DatabaseConfig>,
    pub request_limit: RequestLimitConfig,
    /// Limit applied to post creation, on top of the request limit.
    pub create_post_limit: RateLimitConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let environment: Environment = env::var("APP_ENV")
            .ok()
            .and_then(|v| match v.parse::<Environment>() {
                Ok(environment) => Some(environment),
                Err(e) => {
                    tracing::warn!("Ignoring APP_ENV: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        let on_internal_error: OnInternalError = env::var("RATE_LIMIT_ON_ERROR")
            .ok()
            .and_then(|v| match v.parse::<OnInternalError>() {
                Ok(policy) => Some(policy),
                Err(e) => {
                    tracing::warn!("Ignoring RATE_LIMIT_ON_ERROR: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment,
            database: DatabaseConfig::from_env(),
            request_limit: RequestLimitConfig {
                limiter: RateLimitConfig::from_env(),
                on_internal_error,
                sweep_interval: Duration::from_secs(env_or("RATE_LIMIT_SWEEP_INTERVAL_SECS", 60)),
            },
            create_post_limit: RateLimitConfig {
                max_requests: env_or("CREATE_POST_MAX_REQUESTS", 5),
                window: Duration::from_secs(env_or("CREATE_POST_WINDOW_SECS", 60)),
                policy: WindowPolicy::FirstRequestAnchored,
                key_prefix: String::new(),
            },
            scheduler: SchedulerConfig::from_env(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_or(key, env::var(key).ok(), default)
}

/// Parse `raw` as `T`, warning and falling back to `default` when malformed.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            tracing::warn!("Ignoring {}: {}", key, e);
            default
        }
        None => default,
    }
}
