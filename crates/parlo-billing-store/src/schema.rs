//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Usage session records, keyed by `session_id` (ULID).
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by account, keyed by `account_id || session_id`.
    /// Value is empty (index only).
    pub const SESSIONS_BY_ACCOUNT: &str = "sessions_by_account";

    /// The active session pointer, keyed by `account_id`. Value is the
    /// active `session_id` (16 bytes). At most one entry per account.
    pub const ACTIVE_SESSIONS: &str = "active_sessions";

    /// Purchase records, keyed by `purchase_id` (ULID).
    pub const PURCHASES: &str = "purchases";

    /// Index: purchases by account, keyed by `account_id || purchase_id`.
    /// Value is empty (index only).
    pub const PURCHASES_BY_ACCOUNT: &str = "purchases_by_account";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::SESSIONS,
        cf::SESSIONS_BY_ACCOUNT,
        cf::ACTIVE_SESSIONS,
        cf::PURCHASES,
        cf::PURCHASES_BY_ACCOUNT,
    ]
}
