// src/server/handler.rs
use hyper::{header, Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use tower::Service;

use crate::health::Health;
use crate::metrics::MetricsRegistry;

type HandlerFuture = futures::future::BoxFuture<'static, Result<Response<Body>, hyper::http::Error>>;

/// Serves the health snapshot: `GET <path>` answers 200, or 503 once the
/// service is shutting down. Anything else is a 404.
#[derive(Clone)]
pub struct StatusHandler {
    health: Arc<Health>,
    path: Arc<str>,
}

impl StatusHandler {
    pub fn new(health: Arc<Health>, path: impl Into<Arc<str>>) -> Self {
        Self {
            health,
            path: path.into(),
        }
    }

    async fn respond(health: Arc<Health>) -> Result<Response<Body>, hyper::http::Error> {
        let status = health.status().await;
        if !status.all_healthy() {
            tracing::warn!(
                service = %status.service,
                "health status reports failing or timed out checkers"
            );
        }

        let code = if status.is_shutting_down {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };

        match serde_json::to_vec(&status) {
            Ok(bytes) => Response::builder()
                .status(code)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes)),
            Err(e) => {
                tracing::error!(%e, "failed to encode health status");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal Server Error"))
            }
        }
    }
}

impl Service<Request<Body>> for StatusHandler {
    type Response = Response<Body>;
    type Error = hyper::http::Error;
    type Future = HandlerFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if req.method() != Method::GET || req.uri().path() != &*self.path {
            return Box::pin(async { not_found() });
        }

        let health = self.health.clone();
        Box::pin(Self::respond(health))
    }
}

/// Serves the Prometheus text exposition at its path.
#[derive(Clone)]
pub struct MetricsHandler {
    registry: Arc<MetricsRegistry>,
    path: Arc<str>,
}

impl MetricsHandler {
    pub fn new(registry: Arc<MetricsRegistry>, path: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            path: path.into(),
        }
    }
}

impl Service<Request<Body>> for MetricsHandler {
    type Response = Response<Body>;
    type Error = hyper::http::Error;
    type Future = HandlerFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if req.uri().path() != &*self.path {
            return Box::pin(async { not_found() });
        }

        let response = match self.registry.gather() {
            Ok(metrics) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Body::from(metrics)),
            Err(e) => {
                tracing::error!(%e, "failed to gather metrics");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal Server Error"))
            }
        };
        Box::pin(async move { response })
    }
}

fn not_found() -> Result<Response<Body>, hyper::http::Error> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from("Not Found"))
}
