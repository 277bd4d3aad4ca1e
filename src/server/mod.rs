pub mod handler;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware::map_response;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::ServerConfig;
use crate::initialization::AppContext;
pub use handler::AppState;

impl From<&AppContext> for AppState {
    fn from(context: &AppContext) -> Self {
        Self {
            answering: context.answering.clone(),
            transcriber: context.transcriber.clone(),
        }
    }
}

/// Builds the HTTP router. Requests that outlive the configured timeout are
/// answered with `408 Request Timeout` and a JSON error body.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/chat", post(handler::chat))
        .route("/voice", post(handler::voice))
        .route("/health", get(handler::health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(map_response(handler::timeout_body))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    log::info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received, finishing in-flight requests...");
}
