//! Post procedures.

use actix_web::{HttpRequest, HttpResponse, web};

use postline_core::domain::Post;
use postline_shared::ApiResponse;
use postline_shared::dto::{CreatePostRequest, ListPostsQuery, PostResponse};

use crate::middleware::error::{AppError, AppResult};
use crate::middleware::rate_limit::{UNKNOWN_IDENTIFIER, trusted_proxy_ip};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u64 = 10;
const MAX_LIST_LIMIT: u64 = 100;

fn to_response(post: Post) -> PostResponse {
    PostResponse {
        id: post.id.to_string(),
        name: post.name,
        created_at: post.created_at.to_rfc3339(),
        updated_at: post.updated_at.to_rfc3339(),
    }
}

/// GET /api/posts/recent
pub async fn recent(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let post = state.posts.find_recent().await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(post.map(to_response))))
}

/// GET /api/posts?limit=N
pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<ListPostsQuery>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 {
        return Err(AppError::BadRequest("limit must be positive".to_string()));
    }

    let posts = state.posts.list_recent(limit.min(MAX_LIST_LIMIT)).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        posts.into_iter().map(to_response).collect::<Vec<_>>(),
    )))
}

/// POST /api/posts
///
/// Guarded by the per-route limiter keyed on the proxy-reported client address.
pub async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreatePostRequest>,
) -> AppResult<HttpResponse> {
    let post = Post::new(body.into_inner().name)?;

    let client_ip = trusted_proxy_ip(req.headers()).unwrap_or(UNKNOWN_IDENTIFIER);
    state.create_post_limiter.check(client_ip)?;

    let saved = state.posts.create(post).await?;
    tracing::info!(post_id = %saved.id, "Post created");

    Ok(HttpResponse::Created().json(ApiResponse::ok_with_message(
        to_response(saved),
        "Post created",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::handlers::configure_routes;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use postline_core::ports::{ManualClock, OnInternalError};
    use postline_infra::{
        FixedWindowRateLimiter, InMemoryPostRepository, RateLimitConfig, RateLimitStore,
        RouteRateLimiter,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    fn state(request_limit: u32) -> AppState {
        let clock = Arc::new(ManualClock::new(T0));
        let request_config = RateLimitConfig {
            max_requests: request_limit,
            ..RateLimitConfig::default()
        };

        AppState {
            posts: Arc::new(InMemoryPostRepository::new()),
            request_limiter: Arc::new(
                FixedWindowRateLimiter::with_clock(
                    request_config,
                    Arc::new(RateLimitStore::new()),
                    clock.clone(),
                )
                .unwrap(),
            ),
            on_rate_limit_error: OnInternalError::FailOpen,
            create_post_limiter: Arc::new(
                RouteRateLimiter::with_clock(Duration::from_secs(60), 5, clock).unwrap(),
            ),
            environment: Environment::Development,
        }
    }

    macro_rules! app {
        ($state:expr) => {{
            let state = $state;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(|cfg| configure_routes(cfg, &state)),
            )
            .await
        }};
    }

    fn create_request(name: &str, ip: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(("cf-connecting-ip", ip))
            .set_json(CreatePostRequest {
                name: name.to_string(),
            })
    }

    #[actix_rt::test]
    async fn test_recent_is_null_without_posts() {
        let app = app!(state(100));

        let req = test::TestRequest::get().uri("/api/posts/recent").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body, serde_json::json!({ "success": true, "data": null }));
    }

    #[actix_rt::test]
    async fn test_create_then_recent() {
        let app = app!(state(100));

        let res = test::call_service(&app, create_request("first", "1.2.3.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        test::call_service(&app, create_request("second", "1.2.3.4").to_request()).await;

        let req = test::TestRequest::get().uri("/api/posts/recent").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["name"], "second");

        let req = test::TestRequest::get().uri("/api/posts?limit=5").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }

    #[actix_rt::test]
    async fn test_empty_name_is_rejected() {
        let app = app!(state(100));

        let res = test::call_service(&app, create_request("", "1.2.3.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_zero_list_limit_is_rejected() {
        let app = app!(state(100));

        let req = test::TestRequest::get().uri("/api/posts?limit=0").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_create_limiter_rejects_sixth_post() {
        let app = app!(state(100));

        for i in 0..5 {
            let res = test::call_service(&app, create_request(&format!("post {}", i), "5.6.7.8").to_request()).await;
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        let res = test::call_service(&app, create_request("one too many", "5.6.7.8").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
        assert_eq!(
            body["detail"],
            "Rate limit exceeded. Please try again in 60 seconds."
        );

        // Another client still has its own budget.
        let res = test::call_service(&app, create_request("other", "9.9.9.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[actix_rt::test]
    async fn test_post_routes_carry_rate_limit_headers() {
        let app = app!(state(2));

        for expected in ["1", "0"] {
            let req = test::TestRequest::get().uri("/api/posts/recent").to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(
                res.headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok()),
                Some(expected)
            );
        }

        let req = test::TestRequest::get().uri("/api/posts/recent").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_rt::test]
    async fn test_health_is_not_rate_limited() {
        let app = app!(state(1));

        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/api/health").to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get("x-ratelimit-limit").is_none());
        }
    }
}
