// Laundry Tracker - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use chrono::Utc;
use laundry_tracker::api::{create_router, AppState};
use laundry_tracker::telemetry::init_tracing;
use laundry_tracker::{Config, LaundryService};
use std::time::Duration;
use tracing::{debug, info};

/// How often sensor trackers are advanced without new samples.
const SENSOR_TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env_or_file()?;
    init_tracing(&config.log_level);

    let api_key = config.require_api_key()?.to_string();

    let service = LaundryService::open(&config).context("Failed to open storage")?;
    let state = AppState::new(&service, config.query, &api_key);

    // Timeouts and release windows need a clock even when no sample arrives
    let sensors = service.sensors.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SENSOR_TICK);
        loop {
            interval.tick().await;
            let applied = sensors.tick_all(Utc::now()).await;
            if applied > 0 {
                debug!(applied, "sensor timers fired");
            }
        }
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    info!(bind = %config.server.bind, backend = ?config.storage.backend, "laundry server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    ticker.abort();
    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down, draining usage queue");
}
