use std::sync::Arc;

use courier_dispatch::api;
use courier_dispatch::config::Config;
use courier_dispatch::engine::expiry::{run_expiry_sweeper, run_expiry_worker};
use courier_dispatch::error::AppError;
use courier_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, expiry_rx) = AppState::new(
        config.dispatch_policy(),
        config.event_buffer_size,
        config.webhook_secret.clone(),
    );
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_expiry_worker(
        shared_state.dispatcher.clone(),
        expiry_rx,
    ));
    shared_state.dispatcher.restore_timers().await?;
    tokio::spawn(run_expiry_sweeper(
        shared_state.dispatcher.clone(),
        config.sweep_interval(),
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        assignment_timeout_secs = config.assignment_timeout_secs,
        max_dispatch_attempts = ?config.max_dispatch_attempts,
        signed_webhooks = config.webhook_secret.is_some(),
        "http server started"
    );

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
