//! Application state - shared across all handlers.

use std::sync::Arc;

use postline_core::ports::{OnInternalError, PostRepository, RateLimitError};
use postline_infra::{
    DatabaseConfig, FixedWindowRateLimiter, InMemoryPostRepository, RateLimitStore,
    RouteRateLimiter,
};

#[cfg(feature = "postgres")]
use postline_infra::{DatabaseConnections, PostgresPostRepository};

use crate::config::{AppConfig, Environment};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub posts: Arc<dyn PostRepository>,
    /// Limiter behind the rate limiting middleware, over the process-wide store.
    pub request_limiter: Arc<FixedWindowRateLimiter>,
    pub on_rate_limit_error: OnInternalError,
    /// Private limiter guarding post creation.
    pub create_post_limiter: Arc<RouteRateLimiter>,
    pub environment: Environment,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Result<Self, RateLimitError> {
        let posts = build_post_repository(config.database.as_ref()).await;

        let request_limiter = Arc::new(FixedWindowRateLimiter::new(
            config.request_limit.limiter.clone(),
            Arc::new(RateLimitStore::new()),
        )?);
        let create_post_limiter = Arc::new(RouteRateLimiter::new(
            config.create_post_limit.window,
            config.create_post_limit.max_requests,
        )?);

        tracing::info!(
            max_requests = config.request_limit.limiter.max_requests,
            window_secs = config.request_limit.limiter.window.as_secs(),
            on_error = ?config.request_limit.on_internal_error,
            "Application state initialized"
        );

        Ok(Self {
            posts,
            request_limiter,
            on_rate_limit_error: config.request_limit.on_internal_error,
            create_post_limiter,
            environment: config.environment,
        })
    }
}

#[cfg(feature = "postgres")]
async fn build_post_repository(db_config: Option<&DatabaseConfig>) -> Arc<dyn PostRepository> {
    let Some(config) = db_config else {
        tracing::warn!("DATABASE_URL not set. Running without database (in-memory mode).");
        return Arc::new(InMemoryPostRepository::new());
    };

    match DatabaseConnections::init(config).await {
        Ok(connections) => Arc::new(PostgresPostRepository::new(connections.main)),
        Err(e) => {
            tracing::error!(
                "Failed to connect to database: {}. Using in-memory fallback.",
                e
            );
            Arc::new(InMemoryPostRepository::new())
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_post_repository(_db_config: Option<&DatabaseConfig>) -> Arc<dyn PostRepository> {
    tracing::info!("Running without postgres feature - using in-memory repository");
    Arc::new(InMemoryPostRepository::new())
}
