//! Application state.

use parlo_billing_meter::BillingEngine;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The billing engine (registry, clocks, ledger store).
    pub engine: BillingEngine,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: BillingEngine, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - service-to-service routes will reject all requests");
        }
        if config.payment_webhook_secret.is_none() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not configured - webhook signatures will not be verified");
        }

        Self { engine, config }
    }
}
