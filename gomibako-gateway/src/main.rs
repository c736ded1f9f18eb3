//! Entry point for the `gomibako` HTTP server.

use gomibako_gateway::{
    config::GatewayConfig,
    routes::{create_router, AppState},
};
use gomibako_hub::Hub;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = GatewayConfig::from_env();
    let hub = Hub::start(config.hub.clone());
    let shutdown = CancellationToken::new();
    let state = AppState { registry: hub.registry(), shutdown: shutdown.clone() };
    let app = create_router(state, config.max_body_bytes);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %config.listen_addr, "gomibako listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_ctrl_c(shutdown))
        .await;
    hub.shutdown().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// Resolve on Ctrl-C, cancelling `shutdown` so open live tails end.
async fn wait_for_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    shutdown.cancel();
}
