use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tickly_server::collaborators::{
    LogNotifier, PlainTextRenderer, StructureMembershipGate, TicketDelivery,
};
use tickly_server::config::Config;
use tickly_server::routes::create_routes;
use tickly_server::services::TicketingEngine;
use tickly_server::storage::StorageBackend;
use tickly_server::utils::{AppError, SystemClock};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tickly_server=info,tower_http=info")),
        )
        .init();

    if let Err(e) = run(Config::from_env()).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let storage = match &config.database_url {
        Some(url) => {
            let storage = StorageBackend::postgres(url, config.database_max_connections).await?;
            tracing::info!("Successfully connected to database");
            storage.migrate().await?;
            tracing::info!("Migrations run successfully");
            storage
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            StorageBackend::in_memory()
        }
    };

    let (delivery, _delivery_worker) = TicketDelivery::spawn(
        Arc::new(PlainTextRenderer),
        Arc::new(LogNotifier),
        config.delivery_queue_capacity,
        config.delivery_retry(),
    );

    let engine = TicketingEngine::new(
        storage,
        Arc::new(SystemClock),
        Arc::new(StructureMembershipGate),
        delivery,
        &config.engine_settings(),
    );

    if let Some(period) = config.expiry_sweep_interval {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match engine.expire_ended_tickets().await {
                    Ok(0) => {}
                    Ok(expired) => tracing::info!(expired, "Expired tickets of ended events"),
                    Err(e) => tracing::warn!(error = %e, "Ticket expiry sweep failed"),
                }
            }
        });
    }

    let app = create_routes(engine, &config);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Failed to bind address: {}", e)))?;
    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Server failed: {}", e)))
}
