//! Rate limiting middleware.

use actix_web::{
    Error, HttpResponse, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue},
};
use futures::future::LocalBoxFuture;
use postline_shared::RateLimitExceededResponse;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use postline_core::ports::{OnInternalError, RateLimitResult, RateLimiter};

use crate::middleware::error::AppError;

/// Header set by the trusted proxy with the client address.
pub const TRUSTED_PROXY_IP_HEADER: &str = "cf-connecting-ip";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Identifier used when no client address header is present.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

fn non_empty_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Address reported by the trusted proxy, if any.
pub fn trusted_proxy_ip(headers: &HeaderMap) -> Option<&str> {
    non_empty_header(headers, TRUSTED_PROXY_IP_HEADER)
}

/// Rate limit identifier for a request.
///
/// The forwarded-for value is used verbatim, including any proxy chain.
pub fn client_identifier(headers: &HeaderMap) -> String {
    trusted_proxy_ip(headers)
        .or_else(|| non_empty_header(headers, FORWARDED_FOR_HEADER))
        .unwrap_or(UNKNOWN_IDENTIFIER)
        .to_string()
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
        HeaderValue::from(result.limit),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
        HeaderValue::from(result.remaining),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_RESET_HEADER),
        HeaderValue::from(result.reset_at_secs()),
    );
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    on_internal_error: OnInternalError,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            on_internal_error: OnInternalError::FailOpen,
        }
    }

    pub fn on_internal_error(mut self, policy: OnInternalError) -> Self {
        self.on_internal_error = policy;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            on_internal_error: self.on_internal_error,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    on_internal_error: OnInternalError,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let on_internal_error = self.on_internal_error;
        let identifier = client_identifier(req.headers());

        Box::pin(async move {
            let result = match limiter.check(&identifier).await {
                Ok(result) => result,
                Err(e) => match on_internal_error {
                    OnInternalError::FailOpen => {
                        tracing::error!(identifier = %identifier, error = %e, "Rate limiter error, failing open");
                        let res = service.call(req).await?;
                        return Ok(res.map_into_left_body());
                    }
                    OnInternalError::Propagate => {
                        let response = AppError::from(e).error_response();
                        let (http_req, _payload) = req.into_parts();
                        return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
                    }
                },
            };

            if !result.allowed {
                tracing::warn!(
                    identifier = %identifier,
                    count = result.count,
                    limit = result.limit,
                    "Rate limit exceeded"
                );

                let mut response =
                    HttpResponse::TooManyRequests().json(RateLimitExceededResponse::default());
                insert_rate_limit_headers(response.headers_mut(), &result);

                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            insert_rate_limit_headers(res.headers_mut(), &result);
            Ok(res.map_into_left_body())
        })
    }
}
