//! Client error types.

use parlo_billing_core::Credits;

/// Errors that can occur when using the parlo-billing client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: Credits,
        /// Required amount.
        required: Credits,
    },

    /// Account not found.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account ID.
        account_id: String,
    },
}
