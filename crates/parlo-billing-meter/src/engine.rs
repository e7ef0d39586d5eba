//! The billing engine.
//!
//! Ties the store, the session registry, and the per-session clocks together
//! behind one cloneable handle for the service layer. The engine owns the map
//! of running clocks; every start, stop, and disconnect goes through the
//! map's lock, so at most one clock runs per account and a stop always
//! reaches the clock it means to stop.

use std::collections::HashMap;
use std::sync::Arc;

use parlo_billing_core::{
    package, Account, AccountId, CloseReason, Credits, FinalUsage, Purchase, PurchaseId,
    SessionId, UsageSession, STARTING_GRANT,
};
use parlo_billing_store::{Store, StoreError};
use tokio::sync::{broadcast, Mutex};

use crate::clock::{spawn_clock, MeterHandle};
use crate::error::{MeterError, Result};
use crate::notice::DepletionNotice;
use crate::registry::SessionRegistry;

/// Notices buffered per subscriber before the channel starts lagging.
const DEPLETION_CHANNEL_CAPACITY: usize = 64;

/// The billing engine: accounts, purchases, and metered sessions.
#[derive(Clone)]
pub struct BillingEngine {
    store: Arc<dyn Store>,
    registry: SessionRegistry,
    meters: Arc<Mutex<HashMap<AccountId, MeterHandle>>>,
    depletion_tx: broadcast::Sender<DepletionNotice>,
}

impl BillingEngine {
    /// Create an engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (depletion_tx, _) = broadcast::channel(DEPLETION_CHANNEL_CAPACITY);
        Self {
            registry: SessionRegistry::new(store.clone()),
            store,
            meters: Arc::new(Mutex::new(HashMap::new())),
            depletion_tx,
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an account with the starting credit grant.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::AccountExists` if the account was already
    /// created.
    pub fn create_account(&self, account_id: AccountId) -> Result<Account> {
        if self.store.get_account(&account_id)?.is_some() {
            return Err(MeterError::AccountExists { account_id });
        }
        let account = Account::new(account_id, STARTING_GRANT);
        self.store.put_account(&account)?;
        tracing::info!(
            account_id = %account_id,
            balance = %account.balance,
            "account created"
        );
        Ok(account)
    }

    /// Fetch an account.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` with `NotFound` if the account doesn't
    /// exist.
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })?;
        Ok(account)
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` with `NotFound` if the account doesn't
    /// exist.
    pub fn balance(&self, account_id: &AccountId) -> Result<Credits> {
        Ok(self.store.balance(account_id)?)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Start a metered session for the account.
    ///
    /// If a session is already running, its clock is stopped and the record
    /// closed as superseded before the new one opens. The new session pays
    /// the minimum charge up front; its clock debits every tick after that.
    ///
    /// # Errors
    ///
    /// - `MeterError::InsufficientFunds` if the balance can't cover the
    ///   minimum charge.
    /// - `MeterError::Store` for unknown accounts or storage failures.
    pub async fn start_session(
        &self,
        account_id: AccountId,
        language_from: String,
        language_to: String,
        transport_room: Option<String>,
    ) -> Result<UsageSession> {
        let mut meters = self.meters.lock().await;

        if let Some(handle) = meters.remove(&account_id) {
            let superseded = *handle.session_id();
            match handle.stop(CloseReason::Superseded).await {
                Ok(usage) => tracing::info!(
                    account_id = %account_id,
                    session_id = %superseded,
                    credits_used = %usage.credits_used,
                    "superseded running session"
                ),
                Err(error) => tracing::warn!(
                    account_id = %account_id,
                    session_id = %superseded,
                    error = %error,
                    "failed to finalize superseded session"
                ),
            }
        }

        let session =
            self.registry
                .reserve(account_id, language_from, language_to, transport_room)?;
        let handle = spawn_clock(
            self.store.clone(),
            self.registry.clone(),
            session.session_id,
            self.depletion_tx.clone(),
        );
        meters.insert(account_id, handle);

        tracing::info!(
            account_id = %account_id,
            session_id = %session.session_id,
            language_from = %session.language_from,
            language_to = %session.language_to,
            "session started"
        );
        Ok(session)
    }

    /// Stop a session and return its final usage.
    ///
    /// Safe to call repeatedly, and safe for sessions that already ended on
    /// their own; the stored summary comes back unchanged either way.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` with `NotFound` if no such session
    /// exists.
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<FinalUsage> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "session",
                id: session_id.to_string(),
            })?;

        let mut meters = self.meters.lock().await;
        let handle = match meters.get(&session.account_id) {
            Some(handle) if handle.session_id() == session_id => {
                meters.remove(&session.account_id)
            }
            _ => None,
        };
        if let Some(handle) = handle {
            return handle.stop(CloseReason::Stopped).await;
        }
        drop(meters);

        // No clock to stop; the record closes idempotently.
        self.registry.close(session_id, CloseReason::Stopped)
    }

    /// End the account's running session after a transport disconnect.
    ///
    /// Returns the final usage, or `None` when nothing was running.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` on storage failures.
    pub async fn handle_disconnect(&self, account_id: &AccountId) -> Result<Option<FinalUsage>> {
        let mut meters = self.meters.lock().await;
        if let Some(handle) = meters.remove(account_id) {
            let usage = handle.stop(CloseReason::Disconnected).await?;
            tracing::info!(
                account_id = %account_id,
                session_id = %usage.session_id,
                "session ended by transport disconnect"
            );
            return Ok(Some(usage));
        }
        drop(meters);

        // An active row with no clock can exist after a restart; close the
        // record anyway.
        match self.registry.get_active(account_id)? {
            Some(session) => {
                let usage = self
                    .registry
                    .close(&session.session_id, CloseReason::Disconnected)?;
                Ok(Some(usage))
            }
            None => Ok(None),
        }
    }

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` with `NotFound` if no such session
    /// exists.
    pub fn session(&self, session_id: &SessionId) -> Result<UsageSession> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "session",
                id: session_id.to_string(),
            })?;
        Ok(session)
    }

    /// The account's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` on storage failures.
    pub fn active_session(&self, account_id: &AccountId) -> Result<Option<UsageSession>> {
        self.registry.get_active(account_id)
    }

    /// Session history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` on storage failures.
    pub fn list_sessions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageSession>> {
        Ok(self.store.list_sessions(account_id, limit, offset)?)
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Initiate a purchase of a catalog package.
    ///
    /// The purchase is recorded as pending; credits land only once the
    /// payment provider confirms and [`BillingEngine::complete_purchase`]
    /// runs.
    ///
    /// # Errors
    ///
    /// - `MeterError::UnknownPackage` if `package_index` is not in the
    ///   catalog.
    /// - `MeterError::Store` for unknown accounts or storage failures.
    pub fn initiate_purchase(
        &self,
        account_id: AccountId,
        package_index: usize,
    ) -> Result<Purchase> {
        self.account(&account_id)?;
        let package = package(package_index).ok_or(MeterError::UnknownPackage {
            index: package_index,
        })?;

        let purchase = Purchase::pending(account_id, package.credits, package.price_minor_units);
        self.store.put_purchase(&purchase)?;
        tracing::info!(
            account_id = %account_id,
            purchase_id = %purchase.purchase_id,
            credits = %purchase.credits_granted,
            amount_minor_units = purchase.amount_minor_units,
            "purchase initiated"
        );
        Ok(purchase)
    }

    /// Settle a purchase as paid, crediting the granted amount exactly once.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` if the purchase is unknown or already
    /// failed.
    pub fn complete_purchase(&self, purchase_id: &PurchaseId) -> Result<(Purchase, Credits)> {
        let (purchase, balance) = self.store.complete_purchase(purchase_id)?;
        tracing::info!(
            account_id = %purchase.account_id,
            purchase_id = %purchase_id,
            credits = %purchase.credits_granted,
            balance = %balance,
            "purchase completed"
        );
        Ok((purchase, balance))
    }

    /// Settle a purchase as failed. No credits move.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` if the purchase is unknown or already
    /// completed.
    pub fn fail_purchase(&self, purchase_id: &PurchaseId) -> Result<Purchase> {
        let purchase = self.store.fail_purchase(purchase_id)?;
        tracing::info!(
            account_id = %purchase.account_id,
            purchase_id = %purchase_id,
            "purchase failed"
        );
        Ok(purchase)
    }

    /// Purchase history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` on storage failures.
    pub fn list_purchases(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Purchase>> {
        Ok(self.store.list_purchases(account_id, limit, offset)?)
    }

    // =========================================================================
    // Notices and lifecycle
    // =========================================================================

    /// Subscribe to depletion notices.
    ///
    /// A notice is broadcast whenever a session ends because the account ran
    /// out of credits; the service layer forwards them to the app.
    #[must_use]
    pub fn subscribe_depletions(&self) -> broadcast::Receiver<DepletionNotice> {
        self.depletion_tx.subscribe()
    }

    /// Stop every running clock and finalize its session.
    ///
    /// Called at service shutdown so no session keeps billing past the
    /// process.
    pub async fn shutdown(&self) {
        let handles: Vec<MeterHandle> = {
            let mut meters = self.meters.lock().await;
            meters.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let session_id = *handle.session_id();
            match handle.stop(CloseReason::Stopped).await {
                Ok(usage) => tracing::info!(
                    session_id = %session_id,
                    seconds_used = usage.seconds_used,
                    "session finalized at shutdown"
                ),
                Err(error) => tracing::warn!(
                    session_id = %session_id,
                    error = %error,
                    "failed to finalize session at shutdown"
                ),
            }
        }
    }
}
