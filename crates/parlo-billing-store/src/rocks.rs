//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! Balance-changing operations take a per-account critical section (a striped
//! mutex over the account ID) around their read-modify-write, then commit all
//! affected rows in one `WriteBatch`. Reads never take the stripes.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use parlo_billing_core::{
    Account, AccountId, Credits, Purchase, PurchaseId, PurchaseStatus, SessionId, UsageSession,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Store, TickReceipt};

/// Number of account lock stripes. Contention is per-account already; the
/// stripes only bound memory, so a small fixed count is plenty.
const LOCK_STRIPES: usize = 16;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    account_locks: [Mutex<()>; LOCK_STRIPES],
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "opened billing store");

        Ok(Self {
            db: Arc::new(db),
            account_locks: std::array::from_fn(|_| Mutex::new(())),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Take the account's critical section. All read-modify-write paths for
    /// one account funnel through the same stripe, which serializes them.
    fn account_lock(&self, account_id: &AccountId) -> MutexGuard<'_, ()> {
        let stripe = account_id
            .as_bytes()
            .iter()
            .fold(0usize, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(usize::from(*b))
            })
            % LOCK_STRIPES;
        self.account_locks[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn require_account(&self, account_id: &AccountId) -> Result<Account> {
        self.get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })
    }

    fn require_session(&self, session_id: &SessionId) -> Result<UsageSession> {
        self.get_session(session_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "session",
                id: session_id.to_string(),
            })
    }

    fn require_purchase(&self, purchase_id: &PurchaseId) -> Result<Purchase> {
        self.get_purchase(purchase_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "purchase",
                id: purchase_id.to_string(),
            })
    }

    /// Collect index keys under `prefix`, newest first, honoring paging.
    ///
    /// ULID suffixes sort oldest first on disk, so the account's slice is
    /// collected forward and walked backwards.
    fn index_keys_newest_first(
        &self,
        cf_name: &str,
        prefix: &[u8],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        Ok(all_keys.into_iter().skip(offset).take(limit).collect())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.account_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(account_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn debit(&self, account_id: &AccountId, amount: Credits) -> Result<Credits> {
        if amount <= Credits::ZERO {
            return Err(StoreError::InvalidAmount { amount });
        }

        let _guard = self.account_lock(account_id);
        let mut account = self.require_account(account_id)?;

        if account.balance < amount {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance,
                required: amount,
            });
        }

        let now = Utc::now();
        account.balance = account.balance.saturating_sub(amount);
        account.lifetime_spent = account.lifetime_spent.saturating_add(amount);
        account.last_active_at = Some(now);
        account.updated_at = now;

        self.put_account(&account)?;
        Ok(account.balance)
    }

    fn credit(&self, account_id: &AccountId, amount: Credits) -> Result<Credits> {
        if amount <= Credits::ZERO {
            return Err(StoreError::InvalidAmount { amount });
        }

        let _guard = self.account_lock(account_id);
        let mut account = self.require_account(account_id)?;

        account.balance = account.balance.saturating_add(amount);
        account.updated_at = Utc::now();

        self.put_account(&account)?;
        Ok(account.balance)
    }

    fn balance(&self, account_id: &AccountId) -> Result<Credits> {
        Ok(self.require_account(account_id)?.balance)
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    fn open_session(&self, session: &UsageSession, charge: Credits) -> Result<Credits> {
        let _guard = self.account_lock(&session.account_id);
        let mut account = self.require_account(&session.account_id)?;

        // Callers close any stale session before opening; this is the backstop.
        if self.active_session(&session.account_id)?.is_some() {
            return Err(StoreError::SessionActive {
                account_id: session.account_id,
            });
        }

        if account.balance < charge {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance,
                required: charge,
            });
        }

        let now = Utc::now();
        account.balance = account.balance.saturating_sub(charge);
        account.lifetime_spent = account.lifetime_spent.saturating_add(charge);
        account.last_active_at = Some(now);
        account.updated_at = now;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_account = self.cf(cf::SESSIONS_BY_ACCOUNT)?;
        let cf_active = self.cf(cf::ACTIVE_SESSIONS)?;

        let account_key = keys::account_key(&session.account_id);
        let session_key = keys::session_key(&session.session_id);
        let index_key = keys::account_session_key(&session.account_id, &session.session_id);

        let account_value = Self::serialize(&account)?;
        let session_value = Self::serialize(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, &account_key, &account_value);
        batch.put_cf(&cf_sessions, &session_key, &session_value);
        batch.put_cf(&cf_by_account, &index_key, []);
        batch.put_cf(&cf_active, &account_key, session.session_id.to_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(account.balance)
    }

    fn debit_for_tick(&self, session_id: &SessionId, charge: Credits) -> Result<TickReceipt> {
        // Probe outside the lock to learn which account to serialize on.
        let probe = self.require_session(session_id)?;

        let _guard = self.account_lock(&probe.account_id);
        let mut session = self.require_session(session_id)?;

        if !session.is_active {
            return Err(StoreError::SessionClosed {
                session_id: *session_id,
            });
        }

        let mut account = self.require_account(&session.account_id)?;
        if account.balance < charge {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance,
                required: charge,
            });
        }

        let now = Utc::now();
        account.balance = account.balance.saturating_sub(charge);
        account.lifetime_spent = account.lifetime_spent.saturating_add(charge);
        account.last_active_at = Some(now);
        account.updated_at = now;
        session.apply_tick();

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_sessions = self.cf(cf::SESSIONS)?;

        let account_value = Self::serialize(&account)?;
        let session_value = Self::serialize(&session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, keys::account_key(&session.account_id), &account_value);
        batch.put_cf(&cf_sessions, keys::session_key(session_id), &session_value);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(TickReceipt {
            session,
            balance_after: account.balance,
        })
    }

    fn close_session(&self, session: &UsageSession) -> Result<()> {
        let _guard = self.account_lock(&session.account_id);

        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_account = self.cf(cf::SESSIONS_BY_ACCOUNT)?;
        let cf_active = self.cf(cf::ACTIVE_SESSIONS)?;

        let account_key = keys::account_key(&session.account_id);
        let session_value = Self::serialize(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_sessions, keys::session_key(&session.session_id), &session_value);
        batch.put_cf(
            &cf_by_account,
            keys::account_session_key(&session.account_id, &session.session_id),
            [],
        );

        // Only clear the pointer if it still names this session; a newer
        // session may have replaced it.
        let pointer = self
            .db
            .get_cf(&cf_active, &account_key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if pointer.as_deref() == Some(session.session_id.to_bytes().as_slice()) {
            batch.delete_cf(&cf_active, &account_key);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<UsageSession>> {
        let cf = self.cf(cf::SESSIONS)?;
        let key = keys::session_key(session_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn active_session(&self, account_id: &AccountId) -> Result<Option<UsageSession>> {
        let cf = self.cf(cf::ACTIVE_SESSIONS)?;
        let key = keys::account_key(account_id);

        let Some(raw) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = raw.as_slice().try_into().map_err(|_| {
            StoreError::Serialization("active session pointer is malformed".to_string())
        })?;
        let session_id = SessionId::from_bytes(bytes);

        // Tolerate a dangling or stale pointer; it heals on the next open.
        Ok(self.get_session(&session_id)?.filter(|s| s.is_active))
    }

    fn list_sessions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageSession>> {
        let prefix = keys::account_sessions_prefix(account_id);
        let index_keys =
            self.index_keys_newest_first(cf::SESSIONS_BY_ACCOUNT, &prefix, limit, offset)?;

        let mut sessions = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let session_id = keys::extract_session_id_from_account_key(&key);
            if let Some(session) = self.get_session(&session_id)? {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }

    // =========================================================================
    // Purchase Operations
    // =========================================================================

    fn put_purchase(&self, purchase: &Purchase) -> Result<()> {
        let cf_purchases = self.cf(cf::PURCHASES)?;
        let cf_by_account = self.cf(cf::PURCHASES_BY_ACCOUNT)?;

        let purchase_key = keys::purchase_key(&purchase.purchase_id);
        let index_key = keys::account_purchase_key(&purchase.account_id, &purchase.purchase_id);
        let value = Self::serialize(purchase)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_purchases, &purchase_key, &value);
        batch.put_cf(&cf_by_account, &index_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_purchase(&self, purchase_id: &PurchaseId) -> Result<Option<Purchase>> {
        let cf = self.cf(cf::PURCHASES)?;
        let key = keys::purchase_key(purchase_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_purchases(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Purchase>> {
        let prefix = keys::account_purchases_prefix(account_id);
        let index_keys =
            self.index_keys_newest_first(cf::PURCHASES_BY_ACCOUNT, &prefix, limit, offset)?;

        let mut purchases = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let purchase_id = keys::extract_purchase_id_from_account_key(&key);
            if let Some(purchase) = self.get_purchase(&purchase_id)? {
                purchases.push(purchase);
            }
        }

        Ok(purchases)
    }

    fn complete_purchase(&self, purchase_id: &PurchaseId) -> Result<(Purchase, Credits)> {
        // Probe outside the lock to learn which account to serialize on.
        let probe = self.require_purchase(purchase_id)?;

        let _guard = self.account_lock(&probe.account_id);
        let mut purchase = self.require_purchase(purchase_id)?;

        match purchase.status {
            PurchaseStatus::Completed => {
                // Webhook replay; credits were applied the first time.
                let balance = self.require_account(&purchase.account_id)?.balance;
                return Ok((purchase, balance));
            }
            PurchaseStatus::Failed => {
                return Err(StoreError::PurchaseSettled {
                    purchase_id: *purchase_id,
                    status: purchase.status,
                });
            }
            PurchaseStatus::Pending => {}
        }

        let mut account = self.require_account(&purchase.account_id)?;

        let now = Utc::now();
        account.balance = account.balance.saturating_add(purchase.credits_granted);
        account.lifetime_purchased = account
            .lifetime_purchased
            .saturating_add(purchase.credits_granted);
        account.updated_at = now;
        purchase.complete(now);

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_purchases = self.cf(cf::PURCHASES)?;

        let account_value = Self::serialize(&account)?;
        let purchase_value = Self::serialize(&purchase)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, keys::account_key(&purchase.account_id), &account_value);
        batch.put_cf(&cf_purchases, keys::purchase_key(purchase_id), &purchase_value);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok((purchase, account.balance))
    }

    fn fail_purchase(&self, purchase_id: &PurchaseId) -> Result<Purchase> {
        let probe = self.require_purchase(purchase_id)?;

        let _guard = self.account_lock(&probe.account_id);
        let mut purchase = self.require_purchase(purchase_id)?;

        match purchase.status {
            PurchaseStatus::Failed => return Ok(purchase),
            PurchaseStatus::Completed => {
                return Err(StoreError::PurchaseSettled {
                    purchase_id: *purchase_id,
                    status: purchase.status,
                });
            }
            PurchaseStatus::Pending => {}
        }

        purchase.fail(Utc::now());

        let cf_purchases = self.cf(cf::PURCHASES)?;
        let value = Self::serialize(&purchase)?;
        self.db
            .put_cf(&cf_purchases, keys::purchase_key(purchase_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlo_billing_core::{CloseReason, MIN_SESSION_CHARGE, STARTING_GRANT, TICK_CHARGE};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn seeded_account(store: &RocksStore, balance: Credits) -> AccountId {
        let account_id = AccountId::generate();
        store
            .put_account(&Account::new(account_id, balance))
            .unwrap();
        account_id
    }

    fn start_session(store: &RocksStore, account_id: AccountId) -> UsageSession {
        let session = UsageSession::start(account_id, "en".into(), "ko".into(), None);
        store.open_session(&session, MIN_SESSION_CHARGE).unwrap();
        session
    }

    #[test]
    fn account_crud_and_ledger() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);

        assert_eq!(store.balance(&account_id).unwrap(), Credits::from_whole(10));

        let after_debit = store.debit(&account_id, TICK_CHARGE).unwrap();
        assert_eq!(after_debit, Credits::from_hundredths(995));

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.lifetime_spent, TICK_CHARGE);
        assert!(account.last_active_at.is_some());

        let after_credit = store.credit(&account_id, Credits::from_whole(30)).unwrap();
        assert_eq!(after_credit, Credits::from_hundredths(3995));
        // Plain credits don't count as purchases.
        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.lifetime_purchased, Credits::ZERO);
    }

    #[test]
    fn debit_boundary_is_inclusive() {
        let (store, _dir) = create_test_store();

        let exact = seeded_account(&store, Credits::from_hundredths(5));
        assert_eq!(store.debit(&exact, TICK_CHARGE).unwrap(), Credits::ZERO);

        let short = seeded_account(&store, Credits::from_hundredths(4));
        let result = store.debit(&short, TICK_CHARGE);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds { balance, required })
                if balance == Credits::from_hundredths(4) && required == TICK_CHARGE
        ));
        // A refused debit changes nothing.
        assert_eq!(
            store.balance(&short).unwrap(),
            Credits::from_hundredths(4)
        );
    }

    #[test]
    fn ledger_rejects_non_positive_amounts() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);

        assert!(matches!(
            store.debit(&account_id, Credits::ZERO),
            Err(StoreError::InvalidAmount { .. })
        ));
        assert!(matches!(
            store.credit(&account_id, Credits::from_hundredths(-5)),
            Err(StoreError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn ledger_requires_account() {
        let (store, _dir) = create_test_store();
        let unknown = AccountId::generate();

        assert!(matches!(
            store.debit(&unknown, TICK_CHARGE),
            Err(StoreError::NotFound { entity: "account", .. })
        ));
        assert!(matches!(
            store.balance(&unknown),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn open_session_charges_and_indexes() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);

        let session = UsageSession::start(account_id, "en".into(), "ko".into(), None);
        let balance = store.open_session(&session, MIN_SESSION_CHARGE).unwrap();
        assert_eq!(balance, Credits::from_hundredths(995));

        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.seconds_used, 3);
        assert_eq!(stored.credits_used, MIN_SESSION_CHARGE);

        let active = store.active_session(&account_id).unwrap().unwrap();
        assert_eq!(active.session_id, session.session_id);

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.lifetime_spent, MIN_SESSION_CHARGE);
    }

    #[test]
    fn open_session_requires_minimum_balance() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, Credits::from_hundredths(4));

        let session = UsageSession::start(account_id, "en".into(), "ko".into(), None);
        let result = store.open_session(&session, MIN_SESSION_CHARGE);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds { balance, required })
                if balance == Credits::from_hundredths(4) && required == MIN_SESSION_CHARGE
        ));

        // Nothing was written.
        assert!(store.get_session(&session.session_id).unwrap().is_none());
        assert!(store.active_session(&account_id).unwrap().is_none());

        // Exactly one tick's worth is enough.
        let exact = seeded_account(&store, Credits::from_hundredths(5));
        let session = UsageSession::start(exact, "en".into(), "ko".into(), None);
        let balance = store.open_session(&session, MIN_SESSION_CHARGE).unwrap();
        assert_eq!(balance, Credits::ZERO);
    }

    #[test]
    fn open_session_guards_single_active() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);
        let _first = start_session(&store, account_id);

        let second = UsageSession::start(account_id, "en".into(), "fr".into(), None);
        let result = store.open_session(&second, MIN_SESSION_CHARGE);
        assert!(matches!(result, Err(StoreError::SessionActive { .. })));
    }

    #[test]
    fn tick_debits_and_accumulates() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);
        let session = start_session(&store, account_id);

        let receipt = store.debit_for_tick(&session.session_id, TICK_CHARGE).unwrap();
        assert_eq!(receipt.balance_after, Credits::from_hundredths(990));
        assert_eq!(receipt.session.seconds_used, 6);
        assert_eq!(receipt.session.credits_used, Credits::from_hundredths(10));

        let receipt = store.debit_for_tick(&session.session_id, TICK_CHARGE).unwrap();
        assert_eq!(receipt.balance_after, Credits::from_hundredths(985));
        assert_eq!(receipt.session.seconds_used, 9);
        assert_eq!(receipt.session.credits_used, Credits::from_hundredths(15));

        // The stored row matches the receipt.
        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.seconds_used, 9);
        assert_eq!(stored.credits_used, Credits::from_hundredths(15));
    }

    #[test]
    fn tick_with_short_balance_applies_nothing() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, Credits::from_hundredths(5));
        let session = start_session(&store, account_id); // balance now 0.00

        let result = store.debit_for_tick(&session.session_id, TICK_CHARGE);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds { balance, .. }) if balance == Credits::ZERO
        ));

        // Accumulators untouched by the refused tick.
        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.seconds_used, 3);
        assert_eq!(stored.credits_used, Credits::from_hundredths(5));
        assert_eq!(store.balance(&account_id).unwrap(), Credits::ZERO);
    }

    #[test]
    fn tick_on_closed_session_is_refused() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);
        let mut session = start_session(&store, account_id);

        session.finalize(CloseReason::Stopped, Utc::now());
        store.close_session(&session).unwrap();

        let result = store.debit_for_tick(&session.session_id, TICK_CHARGE);
        assert!(matches!(result, Err(StoreError::SessionClosed { .. })));
    }

    #[test]
    fn close_clears_matching_pointer() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);
        let mut session = start_session(&store, account_id);

        session.finalize(CloseReason::Stopped, Utc::now());
        store.close_session(&session).unwrap();

        assert!(store.active_session(&account_id).unwrap().is_none());
        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.close_reason, Some(CloseReason::Stopped));
    }

    #[test]
    fn stale_close_keeps_newer_pointer() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);

        let mut first = start_session(&store, account_id);
        first.finalize(CloseReason::Superseded, Utc::now());
        store.close_session(&first).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = start_session(&store, account_id);

        // Replaying the first close must not evict the second session's pointer.
        store.close_session(&first).unwrap();
        let active = store.active_session(&account_id).unwrap().unwrap();
        assert_eq!(active.session_id, second.session_id);
    }

    #[test]
    fn session_listing_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut session = start_session(&store, account_id);
            ids.push(session.session_id);
            session.finalize(CloseReason::Stopped, Utc::now());
            store.close_session(&session).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        }

        let all = store.list_sessions(&account_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].session_id, ids[2]); // Newest first
        assert_eq!(all[2].session_id, ids[0]);

        let page = store.list_sessions(&account_id, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].session_id, ids[1]);
    }

    #[test]
    fn purchase_completes_exactly_once() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, Credits::from_whole(2));

        let purchase = Purchase::pending(account_id, Credits::from_whole(30), 400);
        store.put_purchase(&purchase).unwrap();

        let (settled, balance) = store.complete_purchase(&purchase.purchase_id).unwrap();
        assert_eq!(settled.status, PurchaseStatus::Completed);
        assert!(settled.settled_at.is_some());
        assert_eq!(balance, Credits::from_whole(32));

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.lifetime_purchased, Credits::from_whole(30));

        // Webhook replay: no double credit.
        let (replayed, balance) = store.complete_purchase(&purchase.purchase_id).unwrap();
        assert_eq!(replayed.status, PurchaseStatus::Completed);
        assert_eq!(balance, Credits::from_whole(32));

        // A contradictory failure report is refused.
        let result = store.fail_purchase(&purchase.purchase_id);
        assert!(matches!(result, Err(StoreError::PurchaseSettled { .. })));
    }

    #[test]
    fn failed_purchase_leaves_ledger_untouched() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, Credits::from_whole(2));

        let purchase = Purchase::pending(account_id, Credits::from_whole(10), 150);
        store.put_purchase(&purchase).unwrap();

        let failed = store.fail_purchase(&purchase.purchase_id).unwrap();
        assert_eq!(failed.status, PurchaseStatus::Failed);
        assert_eq!(store.balance(&account_id).unwrap(), Credits::from_whole(2));

        // Replay is a no-op.
        let failed = store.fail_purchase(&purchase.purchase_id).unwrap();
        assert_eq!(failed.status, PurchaseStatus::Failed);

        // A contradictory success report is refused.
        let result = store.complete_purchase(&purchase.purchase_id);
        assert!(matches!(result, Err(StoreError::PurchaseSettled { .. })));
    }

    #[test]
    fn unknown_purchase_is_not_found() {
        let (store, _dir) = create_test_store();
        let result = store.complete_purchase(&PurchaseId::generate());
        assert!(matches!(
            result,
            Err(StoreError::NotFound { entity: "purchase", .. })
        ));
    }

    #[test]
    fn purchase_listing_newest_first() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, Credits::ZERO);

        let first = Purchase::pending(account_id, Credits::from_whole(10), 150);
        store.put_purchase(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = Purchase::pending(account_id, Credits::from_whole(30), 400);
        store.put_purchase(&second).unwrap();

        let purchases = store.list_purchases(&account_id, 10, 0).unwrap();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].purchase_id, second.purchase_id);
        assert_eq!(purchases[1].purchase_id, first.purchase_id);
    }

    #[test]
    fn concurrent_debits_never_oversubscribe() {
        let (store, _dir) = create_test_store();
        let account_id = seeded_account(&store, STARTING_GRANT); // 10.00 = 200 ticks

        const WORKERS: usize = 6;
        const ATTEMPTS: usize = 50;

        let succeeded: usize = std::thread::scope(|scope| {
            (0..WORKERS)
                .map(|_| {
                    scope.spawn(|| {
                        (0..ATTEMPTS)
                            .filter(|_| match store.debit(&account_id, TICK_CHARGE) {
                                Ok(_) => true,
                                Err(StoreError::InsufficientFunds { .. }) => false,
                                Err(e) => panic!("unexpected debit failure: {e}"),
                            })
                            .count()
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .sum()
        });

        assert_eq!(succeeded, 200);
        assert_eq!(store.balance(&account_id).unwrap(), Credits::ZERO);
        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.lifetime_spent, STARTING_GRANT);
    }
}
