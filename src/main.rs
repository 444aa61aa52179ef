use std::sync::Arc;

use tower_http::cors::CorsLayer;

use courier_gateway::api::rest;
use courier_gateway::client::{FileStore, HttpCourierApi};
use courier_gateway::config::Config;
use courier_gateway::error::AppError;
use courier_gateway::observability::{logging, metrics::Metrics};
use courier_gateway::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Arc::new(Config::from_env()?);
    logging::init(&config);
    config.log_warnings();
    config.ensure_valid()?;

    let metrics = Arc::new(Metrics::new());
    let courier = Arc::new(HttpCourierApi::new(&config, metrics.clone())?);
    let store = Arc::new(FileStore::new(config.cache_dir.clone()));
    let state = Arc::new(AppState::new(config.clone(), courier, store, metrics));

    let app = rest::router(state.clone()).layer(CorsLayer::permissive());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        courier = config.api_base_url(),
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    state.workflow.tracker().stop_all();
    tracing::info!("http server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
