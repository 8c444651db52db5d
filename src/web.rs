use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::{CacheConfig, ServerConfig};
use crate::resolver::GeocodeResolver;

/// Added on top of the time queued requests can spend waiting, for the
/// provider responses themselves.
const RESPONSE_ALLOWANCE: Duration = Duration::from_secs(60);

/// Long enough for a lookup that finds every queue full and every provider
/// failing, so `/geocode` still gets to answer with a fallback.
fn request_timeout(resolver: &GeocodeResolver) -> Duration {
    resolver.providers().worst_case_wait() + RESPONSE_ALLOWANCE
}

pub fn app(resolver: Arc<GeocodeResolver>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let timeout = request_timeout(&resolver);
    tracing::debug!("Request timeout set to {:?}", timeout);

    api::router(resolver)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run(
    resolver: Arc<GeocodeResolver>,
    server: &ServerConfig,
    cache: &CacheConfig,
) -> Result<()> {
    let sweeper = resolver.spawn_sweeper(cache.sweep_interval());

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Geocoding server running at http://{}", addr);

    axum::serve(listener, app(resolver))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    sweeper.abort();
    tracing::info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
