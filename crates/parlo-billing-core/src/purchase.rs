//! Credit purchase types for parlo-billing.
//!
//! A purchase is recorded as pending when the client picks a package, then
//! settled exactly once when the payment processor reports the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::Credits;
use crate::ids::{AccountId, PurchaseId};

/// A credit package purchase.
///
/// Credits are applied to the balance only on the pending-to-completed
/// transition, and that transition happens at most once; the record is
/// immutable after settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Unique purchase ID (ULID). Doubles as the idempotency key echoed
    /// back by payment webhooks.
    pub purchase_id: PurchaseId,

    /// The account buying credits.
    pub account_id: AccountId,

    /// Credits granted when the purchase completes.
    pub credits_granted: Credits,

    /// Price paid, in minor currency units.
    pub amount_minor_units: i64,

    /// Settlement state.
    pub status: PurchaseStatus,

    /// When the purchase was initiated.
    pub created_at: DateTime<Utc>,

    /// When the purchase reached a terminal state.
    pub settled_at: Option<DateTime<Utc>>,
}

impl Purchase {
    /// Create a new pending purchase.
    #[must_use]
    pub fn pending(account_id: AccountId, credits_granted: Credits, amount_minor_units: i64) -> Self {
        Self {
            purchase_id: PurchaseId::generate(),
            account_id,
            credits_granted,
            amount_minor_units,
            status: PurchaseStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Mark the purchase completed.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = PurchaseStatus::Completed;
        self.settled_at = Some(now);
    }

    /// Mark the purchase failed.
    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = PurchaseStatus::Failed;
        self.settled_at = Some(now);
    }

    /// Whether the purchase has reached a terminal state.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self.status, PurchaseStatus::Pending)
    }
}

/// Settlement state of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Initiated, payment outcome not yet known.
    Pending,

    /// Paid; credits have been applied.
    Completed,

    /// Payment failed or was cancelled; no credits applied.
    Failed,
}
