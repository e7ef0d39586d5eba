//! Depletion notices pushed to connected clients.

use parlo_billing_core::{AccountId, Credits, SessionId};
use serde::{Deserialize, Serialize};

/// Broadcast payload emitted when a session runs its balance down to the
/// depletion floor and is cut off.
///
/// The app uses this to end the call screen immediately and steer the user
/// toward a top-up, instead of discovering a dead session on its next poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepletionNotice {
    /// The depleted account.
    pub account_id: AccountId,

    /// The session that was cut off.
    pub session_id: SessionId,

    /// Total seconds the session accounted for.
    pub seconds_used: i64,

    /// Total credit value of the session.
    pub credits_used: Credits,

    /// Balance left on the account (at most the depletion floor).
    pub balance_remaining: Credits,
}
