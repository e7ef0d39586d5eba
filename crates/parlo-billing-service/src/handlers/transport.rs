//! Transport connection-state event handlers.
//!
//! The media tier reports connect and disconnect for each account. A
//! disconnect ends any running session; the absence of one means the call
//! is still up, so nothing here times sessions out on its own.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::sessions::FinalUsageResponse;
use crate::state::AppState;

/// Transport event request.
#[derive(Debug, Deserialize)]
pub struct TransportEventRequest {
    /// The account whose connection changed.
    pub account_id: String,
    /// What happened.
    pub event: TransportEvent,
}

/// Connection-state transitions the media tier reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    /// The caller's media connection came up.
    Connected,
    /// The caller's media connection dropped.
    Disconnected,
}

/// Transport event response.
#[derive(Debug, Serialize)]
pub struct TransportEventResponse {
    /// Whether the event was accepted.
    pub acknowledged: bool,
    /// Final usage of the session a disconnect ended, when one was running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_usage: Option<FinalUsageResponse>,
}

/// Ingest a connection-state event from the media tier.
pub async fn transport_event(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<TransportEventRequest>,
) -> Result<Json<TransportEventResponse>, ApiError> {
    let account_id = body
        .account_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid account ID".into()))?;

    match body.event {
        TransportEvent::Connected => {
            tracing::debug!(
                account_id = %account_id,
                service = %auth.service_name,
                "transport connected"
            );
            Ok(Json(TransportEventResponse {
                acknowledged: true,
                final_usage: None,
            }))
        }
        TransportEvent::Disconnected => {
            let usage = state.engine.handle_disconnect(&account_id).await?;

            Ok(Json(TransportEventResponse {
                acknowledged: true,
                final_usage: usage.as_ref().map(FinalUsageResponse::from),
            }))
        }
    }
}
