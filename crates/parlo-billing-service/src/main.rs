//! Parlo Billing Service - HTTP API for credit accounting and session metering
//!
//! This is the main entry point for the parlo-billing service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlo_billing_meter::BillingEngine;
use parlo_billing_service::{create_router, AppState, ServiceConfig};
use parlo_billing_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,parlo_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Parlo Billing Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        auth_base_url = %config.auth_base_url,
        "Service configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    // Build the billing engine and app state
    let engine = BillingEngine::new(store);
    let state = AppState::new(engine.clone(), config.clone());

    // Create the router
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Finalize any sessions still metering before the process exits
    engine.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve when the process receives a shutdown signal.
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
    }
}
