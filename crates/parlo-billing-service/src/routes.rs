//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, health, sessions, transport, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for transport event endpoints.
/// The transport tier reports every connect and disconnect, so these see
/// bursts when a media node drains.
const TRANSPORT_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (bearer auth)
/// - `POST /v1/accounts` - Register the caller's billing account
/// - `GET /v1/accounts/me` - Get the caller's account
///
/// ## Credits (bearer auth unless noted)
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/packages` - List purchasable credit packages
/// - `POST /v1/credits/check` - Balance pre-check (service API key auth)
///
/// ## Purchases (bearer auth)
/// - `POST /v1/purchases` - Initiate a credit purchase
/// - `GET /v1/purchases` - List purchase history
///
/// ## Sessions (bearer auth)
/// - `POST /v1/sessions` - Start a metered translation session
/// - `GET /v1/sessions` - List session history
/// - `GET /v1/sessions/active` - Get the active session, if any
/// - `POST /v1/sessions/:session_id/stop` - Stop a session
/// - `GET /v1/sessions/watch` - WebSocket stream of depletion notices
///
/// ## Transport (service API key auth, rate-limited)
/// - `POST /v1/transport/events` - Connection-state events from the media tier
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/payment` - Payment processor settlement events
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Transport events arrive in bursts from the media tier, so they get
    // their own, higher concurrency limit.
    let transport_routes = Router::new()
        .route("/events", post(transport::transport_event))
        .layer(ConcurrencyLimitLayer::new(TRANSPORT_MAX_CONCURRENT_REQUESTS));

    // Create concurrency-limited API routes
    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/packages", get(credits::list_packages))
        .route("/credits/check", post(credits::check_balance))
        // Purchases
        .route("/purchases", post(credits::initiate_purchase))
        .route("/purchases", get(credits::list_purchases))
        // Sessions
        .route("/sessions", post(sessions::start_session))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/active", get(sessions::get_active_session))
        .route("/sessions/:session_id/stop", post(sessions::stop_session))
        .route("/sessions/watch", get(sessions::watch_sessions))
        // Transport routes (with their own concurrency limit)
        .nest("/transport", transport_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/payment", post(webhooks::payment_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
