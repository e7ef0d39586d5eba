//! Error types for parlo-billing storage.

use parlo_billing_core::{AccountId, Credits, PurchaseId, PurchaseStatus, SessionId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was missing.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A debit or credit amount was not positive.
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: Credits,
    },

    /// Balance does not cover the requested debit.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance.
        balance: Credits,
        /// Amount the operation needed.
        required: Credits,
    },

    /// The session has already been finalized.
    #[error("session closed: {session_id}")]
    SessionClosed {
        /// The finalized session.
        session_id: SessionId,
    },

    /// The account already has an active session.
    #[error("account already has an active session: {account_id}")]
    SessionActive {
        /// The account with the running session.
        account_id: AccountId,
    },

    /// The purchase has already reached a terminal state that conflicts
    /// with the requested transition.
    #[error("purchase already settled: {purchase_id} ({status:?})")]
    PurchaseSettled {
        /// The settled purchase.
        purchase_id: PurchaseId,
        /// Its terminal status.
        status: PurchaseStatus,
    },
}
