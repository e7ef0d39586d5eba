//! Account types for parlo-billing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::Credits;
use crate::ids::AccountId;

/// A prepaid billing account.
///
/// One account per app user, keyed by the identity provider's UUID. The
/// balance only ever changes through the ledger store, which commits each
/// debit or credit atomically; a committed balance is never negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account ID (from the identity provider).
    pub account_id: AccountId,

    /// Current credit balance.
    pub balance: Credits,

    /// Lifetime credits added by completed purchases. Monotonic; the
    /// starting grant is not counted.
    pub lifetime_purchased: Credits,

    /// Lifetime credits consumed by metering. Monotonic.
    pub lifetime_spent: Credits,

    /// When the account last started a session or was charged.
    pub last_active_at: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with the given opening balance.
    #[must_use]
    pub fn new(account_id: AccountId, opening_balance: Credits) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            balance: opening_balance,
            lifetime_purchased: Credits::ZERO,
            lifetime_spent: Credits::ZERO,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the balance covers a debit of `amount`.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: Credits) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_carries_opening_balance() {
        let account = Account::new(AccountId::generate(), Credits::from_whole(10));
        assert_eq!(account.balance, Credits::from_whole(10));
        assert_eq!(account.lifetime_purchased, Credits::ZERO);
        assert_eq!(account.lifetime_spent, Credits::ZERO);
        assert!(account.last_active_at.is_none());
    }

    #[test]
    fn sufficiency_is_inclusive() {
        let mut account = Account::new(AccountId::generate(), Credits::ZERO);
        account.balance = Credits::from_hundredths(5);

        assert!(account.has_sufficient_credits(Credits::from_hundredths(4)));
        assert!(account.has_sufficient_credits(Credits::from_hundredths(5)));
        assert!(!account.has_sufficient_credits(Credits::from_hundredths(6)));
    }
}
