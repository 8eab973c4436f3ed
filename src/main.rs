use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod auth;
mod config;
mod db;
mod domain;
mod ingestion;
mod messaging;
mod metrics;
mod service;
mod utils;

use api::AppState;
use config::Settings;
use ingestion::IngestionWorkflow;
use messaging::RedpandaOrderQueue;
use service::OrderService;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,makeline_service=debug"))
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(
        version = %settings.app_version,
        backend = %settings.database.backend.as_str(),
        auth = ?settings.database.auth,
        "Starting makeline service"
    );

    // === 1. Connect the order repository (validated up front, never lazily) ===
    let repo = db::connect_repository(&settings.database).await?;

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Order queue consumer ===
    let queue = Arc::new(RedpandaOrderQueue::new(&settings.queue)?);

    // === 4. Wire service, ingestion and HTTP ===
    let service = OrderService::new(repo, metrics.clone(), settings.call_timeout);
    let ingestion = Arc::new(IngestionWorkflow::new(
        queue,
        service.clone(),
        metrics.clone(),
        settings.call_timeout,
    ));

    let state = AppState {
        service,
        ingestion,
        metrics,
        version: settings.app_version.clone(),
    };

    api::start_server(state, settings.port).await?;

    tracing::info!("Makeline service stopped");
    Ok(())
}
