mod api;
mod config;
mod constants;
mod convert;
mod fetch;
mod http_client;
mod ingest;
mod resolve;
mod storage;
#[cfg(test)]
mod test_support;
mod timegrid;
mod types;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{alive, index, latest, meta, nearest};
use crate::config::Config;
use crate::convert::Grib2JsonConverter;
use crate::http_client::build_client;
use crate::ingest::{spawn_harvester, Harvester};
use crate::resolve::Resolver;
use crate::storage::SnapshotStore;
use crate::types::AppState;
use crate::utils::{init_tracing, service_name};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);
    let store = Arc::new(SnapshotStore::from_config(&cfg));
    store
        .prepare()
        .await
        .with_context(|| format!("Failed to prepare {}", cfg.storage_dir.display()))?;

    let http = build_client(&cfg)?;
    let harvester = Arc::new(Harvester::new(
        &cfg,
        http,
        store.clone(),
        Arc::new(Grib2JsonConverter::from_config(&cfg)),
    ));
    let state = AppState {
        cfg: cfg.clone(),
        store: store.clone(),
        resolver: Resolver::new(store, cfg.harvest_horizon_days),
        harvester: harvester.clone(),
    };

    let harvest_loop = spawn_harvester(harvester, cfg.poll_interval);

    let app = Router::new()
        .route("/wind", get(index))
        .route("/wind/alive", get(alive))
        .route("/wind/latest", get(latest))
        .route("/wind/nearest", get(nearest))
        .route("/wind/meta", get(meta))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

    info!("{} listening on {}", service_name(), cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    harvest_loop.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
