//! svcmgr
//!
//! One binary, four transports over the same service registry:
//! - stdio: MCP JSON-RPC on stdin/stdout
//! - rest-http: REST/JSON API
//! - sse-http: MCP over server-sent events
//! - bidir-http: MCP over bidirectional NDJSON

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use svcmgr_core::{logging::init_logging, Config};
use svcmgr_http::{rest, HttpServer, MiddlewareConfig, RestState};
use svcmgr_managers::{ServiceRegistry, SystemCommandRunner};
use svcmgr_mcp::transport::{sse, stream};
use svcmgr_mcp::{McpHandler, McpServer, SessionTable, StdioTransport, StreamingState};

mod cli;

use cli::{Args, Mode};

/// Upper bound on waiting for blocking tasks at exit. The stdin reader
/// thread never returns on its own while the pipe stays open.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = build_runtime()?;
    let result = runtime.block_on(run(args));
    shutdown_runtime(runtime);
    result
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")
}

fn shutdown_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn run(args: Args) -> Result<()> {
    let mode = args.mode();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    // stdout belongs to the protocol in stdio mode
    let log_handle = init_logging(&config.log, mode == Mode::Stdio)?;
    info!(mode = %mode, version = env!("CARGO_PKG_VERSION"), "Starting svcmgr");

    let runner = Arc::new(SystemCommandRunner::new(config.providers.command_timeout()));
    let registry = Arc::new(ServiceRegistry::detect(runner, &config.providers).await);
    info!(managers = ?registry.managers(), "Service registry ready");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    match mode {
        Mode::Stdio => {
            let server = Arc::new(McpServer::new(registry).with_log_handle(log_handle));
            StdioTransport::new(shutdown)
                .serve(server)
                .await
                .context("stdio transport failed")?;
        }
        Mode::RestHttp => {
            let state = RestState::new(registry, Arc::new(config.clone()));
            serve_http(&config, rest::router(state), MiddlewareConfig::rest(&config.http), shutdown).await?;
        }
        Mode::SseHttp | Mode::BidirHttp => {
            let managers = registry.managers();
            let handler: Arc<dyn McpHandler> = Arc::new(McpServer::new(registry).with_log_handle(log_handle));
            let sessions = SessionTable::new(handler, config.session.clone(), shutdown.clone());
            sessions.spawn_reaper();

            let state = StreamingState::new(sessions, managers, config.server.base_url());
            let router = if mode == Mode::SseHttp {
                sse::router(state)
            } else {
                stream::router(state)
            };
            serve_http(&config, router, MiddlewareConfig::streaming(), shutdown).await?;
        }
    }

    info!("svcmgr stopped");
    Ok(())
}

async fn serve_http(
    config: &Config,
    router: svcmgr_http::axum::Router,
    middleware: MiddlewareConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    HttpServer::builder()
        .bind(config.server.bind_addr())
        .public_url(config.server.base_url())
        .router(router)
        .middleware(middleware)
        .shutdown(shutdown)
        .build()?
        .serve()
        .await
        .with_context(|| format!("HTTP server on {} failed", config.server.bind_addr()))
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_shutdown_does_not_wait_for_blocked_readers() {
        let runtime = build_runtime().unwrap();
        let (_hold, blocked) = std::sync::mpsc::channel::<()>();
        runtime.spawn_blocking(move || {
            let _ = blocked.recv();
        });

        let started = Instant::now();
        shutdown_runtime(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
