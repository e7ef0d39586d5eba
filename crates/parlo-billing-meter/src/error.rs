//! Error types for the metering engine.

use parlo_billing_core::{AccountId, Credits};
use parlo_billing_store::StoreError;

/// Result type for metering operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur in metering operations.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// Balance cannot cover the requested charge.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance.
        balance: Credits,
        /// Amount the operation needed.
        required: Credits,
    },

    /// The account is already registered.
    #[error("account already exists: {account_id}")]
    AccountExists {
        /// The account that already exists.
        account_id: AccountId,
    },

    /// No credit package at the requested catalog index.
    #[error("unknown credit package index: {index}")]
    UnknownPackage {
        /// The out-of-range index.
        index: usize,
    },

    /// The metering clock task went away without reporting.
    #[error("metering clock task failed: {0}")]
    ClockTask(String),

    /// Underlying storage failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MeterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            other => Self::Store(other),
        }
    }
}
