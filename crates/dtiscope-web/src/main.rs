//! dtiscope server
//!
//! Run with: cargo run -p dtiscope-web

use std::net::SocketAddr;

use anyhow::Context;
use dtiscope_common::Settings;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dtiscope=debug,info")),
        )
        .init();

    info!("Starting dtiscope server...");

    let mut settings = Settings::load().context("Failed to load configuration")?;
    if let Ok(bind) = std::env::var("DTISCOPE_BIND") {
        settings.server.bind = bind;
    }
    let addr: SocketAddr = settings
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", settings.server.bind))?;

    let state = dtiscope_web::state::AppState::from_settings(settings)?;
    let shutdown = CancellationToken::new();
    let janitor = state.jobs.spawn_janitor(shutdown.clone());

    let app = dtiscope_web::router::build_router(state);

    info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = janitor.await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("Failed to listen for shutdown signal: {e}");
                return;
            }
            info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
}
