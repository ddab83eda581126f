//! HTTP handlers and route configuration.

mod health;
mod posts;

use actix_web::web;

use crate::middleware::logging::RequestLogging;
use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::state::AppState;

/// Configure all application routes.
///
/// Post procedures run behind the rate limiter (outermost) and request logging.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Post procedures
            .service(
                web::scope("/posts")
                    .wrap(RequestLogging::new(state.environment))
                    .wrap(
                        RateLimitMiddleware::new(state.request_limiter.clone())
                            .on_internal_error(state.on_rate_limit_error),
                    )
                    .route("", web::get().to(posts::list))
                    .route("", web::post().to(posts::create))
                    .route("/recent", web::get().to(posts::recent)),
            ),
    );
}
