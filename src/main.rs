//! arena-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use arena_gateway::api;
use arena_gateway::app_state::AppState;
use arena_gateway::config::{GatewayConfig, LogFormat};
use arena_gateway::persistence::{LedgerStore, MemoryLedgerStore, PostgresLedgerStore};
use arena_gateway::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting arena-gateway");

    let store: Arc<dyn LedgerStore> = if config.persistence_enabled {
        let pg = PostgresLedgerStore::connect(&config)
            .await
            .context("connecting to PostgreSQL")?;
        tracing::info!("using PostgreSQL ledger store");
        Arc::new(pg)
    } else {
        tracing::warn!("persistence disabled; balances live in memory only");
        Arc::new(MemoryLedgerStore::new())
    };

    let listen_addr = config.listen_addr;
    let reconcile_interval = config.reconcile_interval();
    let app_state = AppState::build(store, config);

    if let Some(interval) = reconcile_interval {
        let _sweep = Arc::clone(&app_state.sweep).spawn(interval);
        tracing::info!(interval_secs = interval.as_secs(), "reconciliation sweep scheduled");
    }

    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
