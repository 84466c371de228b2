//! Shared Middleware Stack
//!
//! Applied to every HTTP mode. Streaming modes turn compression and the
//! request timeout off, since both would break long-lived responses.

use axum::{
    body::Body,
    http::{HeaderName, Request},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::time::{Duration, Instant};
use svcmgr_core::HttpConfig;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Session id headers the browser is allowed to read
const EXPOSED_HEADERS: [&str; 2] = ["x-mcp-client-id", "x-mcp-session-id"];

#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    /// Enable CORS (default: true)
    pub cors_enabled: bool,
    /// CORS allowed origins (None = any)
    pub cors_origins: Option<Vec<String>>,
    /// Enable request tracing spans (default: true)
    pub tracing_enabled: bool,
    /// Enable response compression (default: true)
    pub compression_enabled: bool,
    /// Request timeout (default: 30s, None = unbounded)
    pub timeout: Option<Duration>,
    /// Enable per-request access logging (default: true)
    pub request_logging: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            cors_enabled: true,
            cors_origins: None,
            tracing_enabled: true,
            compression_enabled: true,
            timeout: Some(Duration::from_secs(30)),
            request_logging: true,
        }
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// REST settings from the `http` config section
    pub fn rest(config: &HttpConfig) -> Self {
        Self::default()
            .compression(config.compression)
            .timeout(Some(Duration::from_secs(config.request_timeout_secs)).filter(|t| !t.is_zero()))
    }

    /// Long-lived SSE and NDJSON responses: no compression, no timeout
    pub fn streaming() -> Self {
        Self::default().compression(false).timeout(None)
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors_enabled = enabled;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }
}

/// Middleware stack that can be applied to a router
pub struct MiddlewareStack {
    config: MiddlewareConfig,
}

impl MiddlewareStack {
    pub fn new(config: MiddlewareConfig) -> Self {
        Self { config }
    }

    pub fn default_stack() -> Self {
        Self::new(MiddlewareConfig::default())
    }

    /// Apply the middleware stack to a router
    pub fn apply(self, router: Router) -> Router {
        let mut router = router;

        if self.config.request_logging {
            router = router.layer(middleware::from_fn(request_logging_middleware));
        }

        if let Some(timeout) = self.config.timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }

        if self.config.compression_enabled {
            router = router.layer(CompressionLayer::new());
        }

        if self.config.tracing_enabled {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            );
        }

        // CORS (outermost - runs first on request)
        if self.config.cors_enabled {
            let cors = match self.config.cors_origins {
                Some(ref origins) => {
                    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
                    CorsLayer::new().allow_origin(origins)
                }
                None => CorsLayer::new().allow_origin(Any),
            };
            let cors = cors
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static));
            router = router.layer(cors);
        }

        router
    }
}

/// Request logging middleware
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(%method, %uri, status, elapsed_ms, "HTTP request");
    } else if response.status().is_client_error() {
        tracing::warn!(%method, %uri, status, elapsed_ms, "HTTP request");
    } else {
        tracing::info!(%method, %uri, status, elapsed_ms, "HTTP request");
    }

    response
}

/// Convenience function to apply middleware with config
pub fn apply_middleware(router: Router, config: MiddlewareConfig) -> Router {
    MiddlewareStack::new(config).apply(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[test]
    fn test_rest_config_follows_http_section() {
        let config = MiddlewareConfig::rest(&HttpConfig {
            request_timeout_secs: 5,
            compression: false,
        });
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert!(!config.compression_enabled);

        let config = MiddlewareConfig::rest(&HttpConfig {
            request_timeout_secs: 0,
            compression: true,
        });
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_streaming_config() {
        let config = MiddlewareConfig::streaming();
        assert!(config.cors_enabled);
        assert!(!config.compression_enabled);
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_cors_exposes_session_headers() {
        let router = apply_middleware(
            Router::new().route("/ping", get(|| async { "pong" })),
            MiddlewareConfig::default(),
        );
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("origin", "http://example.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let exposed = response
            .headers()
            .get("access-control-expose-headers")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        assert!(exposed.contains("x-mcp-client-id"));
        assert!(exposed.contains("x-mcp-session-id"));
    }
}
