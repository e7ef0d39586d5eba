//! Request and response types for the parlo-billing client.

use chrono::{DateTime, Utc};
use parlo_billing_core::{CloseReason, Credits};
use serde::{Deserialize, Serialize};

/// Balance check request.
#[derive(Debug, Clone, Serialize)]
pub struct CheckBalanceRequest {
    /// Account to check.
    pub account_id: String,
    /// Required credit amount.
    pub required: Credits,
}

/// Balance check response.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckBalanceResponse {
    /// Whether the account can cover the required amount.
    pub sufficient: bool,
    /// Current balance.
    pub balance: Credits,
    /// Required amount.
    pub required: Credits,
}

/// Transport lifecycle event.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    /// Media connection established.
    Connected,
    /// Media connection dropped.
    Disconnected,
}

/// Transport event request.
#[derive(Debug, Clone, Serialize)]
pub struct TransportEventRequest {
    /// Account whose connection changed.
    pub account_id: String,
    /// What happened.
    pub event: TransportEvent,
}

/// Transport event response.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportEventResponse {
    /// Whether the event was accepted.
    pub acknowledged: bool,
    /// Usage of the session a disconnect ended, if one was running.
    #[serde(default)]
    pub final_usage: Option<SessionUsage>,
}

/// Final usage of a closed session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUsage {
    /// Session ID.
    pub session_id: String,
    /// Total seconds accounted for.
    pub seconds_used: i64,
    /// Total credit value of the session.
    pub credits_used: Credits,
    /// Why the session ended.
    pub close_reason: CloseReason,
    /// When metering began.
    pub started_at: DateTime<Utc>,
    /// When the session was finalized.
    pub ended_at: DateTime<Utc>,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub balance: Credits,
    /// How many seconds of translation the balance buys.
    pub talk_seconds_remaining: i64,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
