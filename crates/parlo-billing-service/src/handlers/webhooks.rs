//! Payment processor webhook handlers.
//!
//! Settlement is idempotent at the store layer: completing a completed
//! purchase is a no-op, so webhook redelivery never double-credits.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::ApiError;
use crate::state::AppState;

/// Payment webhook payload.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    /// Processor-side event ID.
    pub event_id: String,
    /// Event type ("payment.succeeded" or "payment.failed").
    pub event_type: String,
    /// The purchase this event settles; echoed from purchase initiation.
    pub purchase_id: String,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle payment settlement webhooks.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Verify webhook signature if secret is configured
    if let Some(webhook_secret) = &state.config.payment_webhook_secret {
        let signature = headers
            .get("x-payment-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing payment signature".into()))?;

        verify_payment_signature(&body, signature, webhook_secret).map_err(|e| {
            tracing::warn!(error = %e, "Invalid payment webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Payment webhook secret not configured - skipping signature verification");
    }

    // Parse webhook payload
    let webhook: PaymentWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.event_id,
        purchase_id = %webhook.purchase_id,
        "Received payment webhook"
    );

    let purchase_id = webhook.purchase_id.parse().map_err(|_| {
        ApiError::BadRequest(format!("Invalid purchase_id: {}", webhook.purchase_id))
    })?;

    // Handle different event types
    match webhook.event_type.as_str() {
        "payment.succeeded" => {
            state.engine.complete_purchase(&purchase_id)?;
        }
        "payment.failed" => {
            state.engine.fail_purchase(&purchase_id)?;
        }
        _ => {
            tracing::debug!(event_type = %webhook.event_type, "Unhandled payment event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

// ============================================================================
// Signature Verification Helpers
// ============================================================================

/// Verify a payment webhook signature.
///
/// The processor signs the raw body with HMAC-SHA256 under the shared
/// secret and sends the hex-encoded result in `x-payment-signature`.
fn verify_payment_signature(body: &str, signature: &str, secret: &str) -> Result<(), String> {
    let expected = hmac_sha256_hex(secret, body);

    // Use constant-time comparison to prevent timing attacks
    if constant_time_eq(&expected, signature) {
        Ok(())
    } else {
        Err("Signature mismatch".into())
    }
}
