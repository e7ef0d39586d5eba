//! The session registry.
//!
//! Thin, store-backed bookkeeping for session lifecycles. The registry never
//! caches activity state of its own; the store's active-session pointer is
//! the single source of truth, which is what makes `close` idempotent and
//! safe to call from racing paths (user stop, depletion, supersession,
//! transport disconnect).

use std::sync::Arc;

use chrono::Utc;
use parlo_billing_core::{
    AccountId, CloseReason, FinalUsage, SessionId, UsageSession, MIN_SESSION_CHARGE,
};
use parlo_billing_store::{Store, StoreError};

use crate::error::Result;

/// Store-backed session registry.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn Store>,
}

impl SessionRegistry {
    /// Create a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reserve a new session for the account.
    ///
    /// Any session still marked active is closed first as superseded (its
    /// clock, if one is running, is the caller's job to stop beforehand).
    /// The new session is then opened atomically with the minimum charge.
    ///
    /// # Errors
    ///
    /// - `MeterError::InsufficientFunds` if the balance is below the minimum.
    /// - `MeterError::Store` for unknown accounts or storage failures.
    pub fn reserve(
        &self,
        account_id: AccountId,
        language_from: String,
        language_to: String,
        transport_room: Option<String>,
    ) -> Result<UsageSession> {
        if let Some(stale) = self.store.active_session(&account_id)? {
            tracing::info!(
                account_id = %account_id,
                session_id = %stale.session_id,
                "closing stale session before reserving a new one"
            );
            self.close(&stale.session_id, CloseReason::Superseded)?;
        }

        let session = UsageSession::start(account_id, language_from, language_to, transport_room);
        self.store.open_session(&session, MIN_SESSION_CHARGE)?;
        Ok(session)
    }

    /// The account's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` on storage failures.
    pub fn get_active(&self, account_id: &AccountId) -> Result<Option<UsageSession>> {
        Ok(self.store.active_session(account_id)?)
    }

    /// Close a session and return its final usage.
    ///
    /// Idempotent: closing an already-finalized session returns the stored
    /// summary unchanged, with no further writes. Otherwise the record is
    /// reconciled against wall-clock elapsed time and persisted; the ledger
    /// balance is never adjusted here.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::Store` if the session doesn't exist or storage
    /// fails.
    pub fn close(&self, session_id: &SessionId, reason: CloseReason) -> Result<FinalUsage> {
        let mut session =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "session",
                    id: session_id.to_string(),
                })?;

        if !session.is_active {
            return Ok(session.final_usage());
        }

        let usage = session.finalize(reason, Utc::now());
        self.store.close_session(&session)?;

        tracing::debug!(
            session_id = %session_id,
            reason = ?reason,
            seconds_used = usage.seconds_used,
            credits_used = %usage.credits_used,
            "session closed"
        );
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeterError;
    use parlo_billing_core::{Account, Credits, STARTING_GRANT};
    use parlo_billing_store::RocksStore;
    use tempfile::TempDir;

    fn test_registry() -> (SessionRegistry, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (SessionRegistry::new(store.clone()), store, dir)
    }

    fn seeded(store: &RocksStore, balance: Credits) -> AccountId {
        let account_id = AccountId::generate();
        store
            .put_account(&Account::new(account_id, balance))
            .unwrap();
        account_id
    }

    #[test]
    fn reserve_supersedes_a_stale_session() {
        let (registry, store, _dir) = test_registry();
        let account_id = seeded(&store, STARTING_GRANT);

        let first = registry
            .reserve(account_id, "en".into(), "ko".into(), None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = registry
            .reserve(account_id, "en".into(), "fr".into(), None)
            .unwrap();

        let stored_first = store.get_session(&first.session_id).unwrap().unwrap();
        assert!(!stored_first.is_active);
        assert_eq!(stored_first.close_reason, Some(CloseReason::Superseded));

        let active = registry.get_active(&account_id).unwrap().unwrap();
        assert_eq!(active.session_id, second.session_id);

        // Both sessions paid their minimum charge.
        assert_eq!(
            store.balance(&account_id).unwrap(),
            Credits::from_hundredths(990)
        );
    }

    #[test]
    fn close_is_idempotent() {
        let (registry, store, _dir) = test_registry();
        let account_id = seeded(&store, STARTING_GRANT);
        let session = registry
            .reserve(account_id, "en".into(), "ko".into(), None)
            .unwrap();

        let first = registry
            .close(&session.session_id, CloseReason::Stopped)
            .unwrap();
        let second = registry
            .close(&session.session_id, CloseReason::Disconnected)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.close_reason, CloseReason::Stopped);
        // The minimum charge stands; nothing was refunded or re-billed.
        assert_eq!(
            store.balance(&account_id).unwrap(),
            Credits::from_hundredths(995)
        );
    }

    #[test]
    fn close_of_unknown_session_is_not_found() {
        let (registry, _store, _dir) = test_registry();
        let result = registry.close(&SessionId::generate(), CloseReason::Stopped);
        assert!(matches!(
            result,
            Err(MeterError::Store(StoreError::NotFound { .. }))
        ));
    }
}
