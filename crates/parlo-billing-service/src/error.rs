//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parlo_billing_core::Credits;
use serde::Serialize;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: Credits,
        /// Required amount.
        required: Credits,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<parlo_billing_store::StoreError> for ApiError {
    fn from(err: parlo_billing_store::StoreError) -> Self {
        use parlo_billing_store::StoreError;
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientFunds { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::InvalidAmount { amount } => {
                Self::BadRequest(format!("invalid amount: {amount}"))
            }
            StoreError::SessionClosed { session_id } => {
                Self::Conflict(format!("session already closed: {session_id}"))
            }
            StoreError::SessionActive { account_id } => {
                Self::Conflict(format!("account already has an active session: {account_id}"))
            }
            StoreError::PurchaseSettled { purchase_id, status } => {
                Self::Conflict(format!("purchase already settled: {purchase_id} ({status:?})"))
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<parlo_billing_meter::MeterError> for ApiError {
    fn from(err: parlo_billing_meter::MeterError) -> Self {
        use parlo_billing_meter::MeterError;
        match err {
            MeterError::InsufficientFunds { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            MeterError::AccountExists { account_id } => {
                Self::Conflict(format!("account already exists: {account_id}"))
            }
            MeterError::UnknownPackage { index } => {
                Self::BadRequest(format!("unknown credit package index: {index}"))
            }
            MeterError::ClockTask(msg) => Self::Internal(msg),
            MeterError::Store(e) => Self::from(e),
        }
    }
}
