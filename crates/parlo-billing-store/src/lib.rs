//! `RocksDB` ledger storage for parlo-billing.
//!
//! This crate persists accounts, usage sessions, and purchases, and commits
//! every balance change atomically. Compound operations (starting a session,
//! applying a metering tick, settling a purchase) update the ledger and the
//! affected records in a single write batch under a per-account critical
//! section, so a committed balance is never negative and readers never see a
//! half-applied charge.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Primary account records, keyed by `account_id`
//! - `sessions`: Usage session records, keyed by `session_id` (ULID)
//! - `sessions_by_account`: Index for listing an account's sessions
//! - `active_sessions`: Pointer to the account's active session, if any
//! - `purchases`: Purchase records, keyed by `purchase_id` (ULID)
//! - `purchases_by_account`: Index for listing an account's purchases
//!
//! # Example
//!
//! ```no_run
//! use parlo_billing_store::{RocksStore, Store};
//! use parlo_billing_core::{Account, AccountId, STARTING_GRANT};
//!
//! let store = RocksStore::open("/tmp/parlo-billing-db").unwrap();
//!
//! let account_id = AccountId::generate();
//! store.put_account(&Account::new(account_id, STARTING_GRANT)).unwrap();
//! let balance = store.balance(&account_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use parlo_billing_core::{Account, AccountId, Credits, Purchase, PurchaseId, SessionId, UsageSession};

/// The outcome of applying one metering tick.
#[derive(Debug, Clone)]
pub struct TickReceipt {
    /// The session with the tick folded into its accumulators.
    pub session: UsageSession,

    /// Account balance after the tick's debit.
    pub balance_after: Credits,
}

/// The storage trait defining all ledger operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g., `RocksDB`, in-memory for testing). All methods are
/// synchronous; implementations are expected to be cheap, local, and safe to
/// call from blocking contexts.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Atomically subtract `amount` from the balance.
    ///
    /// Refuses rather than overdraws: the whole debit applies or none of it.
    /// Also advances `lifetime_spent` and `last_active_at`. Returns the new
    /// balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not positive.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if the balance is short.
    fn debit(&self, account_id: &AccountId, amount: Credits) -> Result<Credits>;

    /// Atomically add `amount` to the balance. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not positive.
    /// - `StoreError::NotFound` if the account doesn't exist.
    fn credit(&self, account_id: &AccountId, amount: Credits) -> Result<Credits>;

    /// Read the current balance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn balance(&self, account_id: &AccountId) -> Result<Credits>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Start a session: debit the start charge, write the session record,
    /// and point the active-session index at it, all in one batch.
    ///
    /// Returns the balance after the start charge.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if the balance can't cover `charge`.
    /// - `StoreError::SessionActive` if the account already has an active
    ///   session (callers are expected to close it first).
    fn open_session(&self, session: &UsageSession, charge: Credits) -> Result<Credits>;

    /// Apply one metering tick: debit `charge` and fold the tick into the
    /// session's accumulators, in one batch.
    ///
    /// On `InsufficientFunds` nothing is applied; the session keeps its
    /// pre-tick accumulators.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the session or its account doesn't exist.
    /// - `StoreError::SessionClosed` if the session was already finalized.
    /// - `StoreError::InsufficientFunds` if the balance can't cover `charge`.
    fn debit_for_tick(&self, session_id: &SessionId, charge: Credits) -> Result<TickReceipt>;

    /// Persist a finalized session and clear the active-session pointer if
    /// it still refers to this session. Does not touch the balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn close_session(&self, session: &UsageSession) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<UsageSession>>;

    /// Get the account's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn active_session(&self, account_id: &AccountId) -> Result<Option<UsageSession>>;

    /// List sessions for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageSession>>;

    // =========================================================================
    // Purchase Operations
    // =========================================================================

    /// Insert a purchase record and maintain the account index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_purchase(&self, purchase: &Purchase) -> Result<()>;

    /// Get a purchase by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_purchase(&self, purchase_id: &PurchaseId) -> Result<Option<Purchase>>;

    /// List purchases for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_purchases(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Purchase>>;

    /// Settle a purchase as completed: credit the granted amount, advance
    /// `lifetime_purchased`, and stamp `settled_at`, in one batch. The
    /// pending-to-completed transition happens at most once; replaying a
    /// completed purchase is a no-op that returns the stored record.
    ///
    /// Returns the purchase and the balance after crediting.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the purchase or its account doesn't exist.
    /// - `StoreError::PurchaseSettled` if the purchase already failed.
    fn complete_purchase(&self, purchase_id: &PurchaseId) -> Result<(Purchase, Credits)>;

    /// Settle a purchase as failed. The ledger is untouched. Replaying a
    /// failed purchase is a no-op that returns the stored record.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the purchase doesn't exist.
    /// - `StoreError::PurchaseSettled` if the purchase already completed.
    fn fail_purchase(&self, purchase_id: &PurchaseId) -> Result<Purchase>;
}
