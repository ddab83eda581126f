//! # Postline API Server
//!
//! The main entry point for the Actix-web HTTP server.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use background::{Scheduler, schedule_rate_limit_sweep};
use config::AppConfig;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Postline API Server on {}:{} ({:?})",
        config.host,
        config.port,
        config.environment
    );

    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // Expired windows are swept from the shared store in the background
    let mut scheduler = Scheduler::new(config.scheduler.clone())
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    schedule_rate_limit_sweep(
        &scheduler,
        state.request_limiter.clone(),
        config.request_limit.sweep_interval,
    )
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))?;
    scheduler
        .start()
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        let state = app_state.clone();
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|cfg| handlers::configure_routes(cfg, &state))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }

    server
}
