//! Request timing middleware.

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;

use crate::config::Environment;

/// Logs how long each request took. Disabled in development.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogging {
    enabled: bool,
}

impl RequestLogging {
    pub fn new(environment: Environment) -> Self {
        Self {
            enabled: environment != Environment::Development,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingService {
            service,
            enabled: self.enabled,
        }))
    }
}

pub struct RequestLoggingService<S> {
    service: S,
    enabled: bool,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.enabled {
            return Box::pin(self.service.call(req));
        }

        let method = req.method().clone();
        let uri = req.uri().clone();
        let start = Instant::now();
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            tracing::info!(
                method = %method,
                uri = %uri,
                elapsed_ms,
                "{} {} took {:.3}ms",
                method,
                uri,
                elapsed_ms
            );
            res
        })
    }
}
