use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ride_dispatch::api;
use ride_dispatch::config::Config;
use ride_dispatch::engine::dispatch::run_dispatch_engine;
use ride_dispatch::error::AppError;
use ride_dispatch::session::run_session_janitor;
use ride_dispatch::state::AppState;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, dispatch_rx) = AppState::new(&config)?;
    let shared_state = Arc::new(app_state);

    tracing::info!(
        operators = shared_state.operators.snapshot().len(),
        cities = shared_state.pricing.cities().len(),
        offer_fanout = config.offer_fanout,
        "state initialised"
    );

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_dispatch_engine(shared_state.clone(), dispatch_rx));
    tokio::spawn(run_session_janitor(shared_state.clone(), JANITOR_INTERVAL));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
