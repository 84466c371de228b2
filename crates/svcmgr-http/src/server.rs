//! HTTP Server
//!
//! Binds one listener, serves the composed router and drains in-flight
//! requests when the shutdown token is cancelled.

use crate::middleware::{apply_middleware, MiddlewareConfig};
use crate::{Result, ServerError};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct HttpServer {
    addr: String,
    public_url: Option<String>,
    router: Router,
    shutdown: CancellationToken,
}

impl HttpServer {
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The fully layered router, as it will be served
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until the shutdown token fires
    pub async fn serve(self) -> Result<()> {
        // Resolves host names as well as literal addresses
        let listener = TcpListener::bind(self.addr.as_str())
            .await
            .map_err(ServerError::BindError)?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().map_err(ServerError::BindError)?;
        info!("HTTP server listening on http://{}", local);
        if let Some(url) = &self.public_url {
            info!("Public URL: {}", url);
        }

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(ServerError::BindError)?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Builder for HttpServer
pub struct HttpServerBuilder {
    bind_host: String,
    port: u16,
    public_url: Option<String>,
    router: Option<Router>,
    middleware_config: MiddlewareConfig,
    shutdown: CancellationToken,
}

impl HttpServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: None,
            router: None,
            middleware_config: MiddlewareConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set bind address (host:port format or just port)
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        if let Some((host, port)) = addr.rsplit_once(':') {
            self.bind_host = host.to_string();
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        } else if let Ok(p) = addr.parse::<u16>() {
            self.port = p;
        }
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// URL logged at startup for clients
    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn middleware(mut self, config: MiddlewareConfig) -> Self {
        self.middleware_config = config;
        self
    }

    /// Token whose cancellation stops the server
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Result<HttpServer> {
        let router = self
            .router
            .ok_or_else(|| ServerError::RouterError("no router configured".to_string()))?;
        let router = apply_middleware(router, self.middleware_config);

        Ok(HttpServer {
            addr: format!("{}:{}", self.bind_host, self.port),
            public_url: self.public_url,
            router,
            shutdown: self.shutdown,
        })
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
