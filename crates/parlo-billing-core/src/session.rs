//! Usage session types for parlo-billing.
//!
//! A usage session is the billable span of one live translation call. It is
//! charged the minimum up front, then one tick at a time while it runs; on
//! close the record is reconciled against wall-clock elapsed time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::Credits;
use crate::ids::{AccountId, SessionId};
use crate::rate::{credits_for_seconds, MIN_SESSION_CHARGE, TICK_CHARGE, TICK_SECONDS};

/// A metered translation session.
///
/// `seconds_used` and `credits_used` are monotonic while the session is
/// active: the start charge covers the first tick's worth, and each applied
/// tick adds one more. At most one session per account is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSession {
    /// Unique session ID (ULID, time-ordered).
    pub session_id: SessionId,

    /// The account being metered.
    pub account_id: AccountId,

    /// Source language code (for example "en").
    pub language_from: String,

    /// Target language code (for example "ko").
    pub language_to: String,

    /// Opaque transport room token minted by the media tier, if the call
    /// runs over a shared room.
    pub transport_room: Option<String>,

    /// Seconds of usage accounted for so far.
    pub seconds_used: i64,

    /// Credits charged to the ledger so far (start charge plus ticks). After
    /// close this may exceed the ledger charge when wall-clock reconciliation
    /// raises the historical figure.
    pub credits_used: Credits,

    /// Whether the session is still being metered.
    pub is_active: bool,

    /// Why the session ended, once it has.
    pub close_reason: Option<CloseReason>,

    /// When metering began.
    pub started_at: DateTime<Utc>,

    /// When the session was finalized.
    pub ended_at: Option<DateTime<Utc>>,
}

impl UsageSession {
    /// Create a newly started session.
    ///
    /// The record opens having already accounted for the minimum charge:
    /// `seconds_used` starts at one tick's worth and `credits_used` at the
    /// start charge. The matching debit is the store's job.
    #[must_use]
    pub fn start(
        account_id: AccountId,
        language_from: String,
        language_to: String,
        transport_room: Option<String>,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            account_id,
            language_from,
            language_to,
            transport_room,
            seconds_used: TICK_SECONDS,
            credits_used: MIN_SESSION_CHARGE,
            is_active: true,
            close_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Fold one successful metering tick into the accumulators.
    pub fn apply_tick(&mut self) {
        self.seconds_used += TICK_SECONDS;
        self.credits_used = self.credits_used.saturating_add(TICK_CHARGE);
    }

    /// Finalize the session and return its closing summary.
    ///
    /// Reconciles the record against wall-clock time: `seconds_used` becomes
    /// the larger of the tick-accumulated figure and the elapsed seconds
    /// since start, and `credits_used` is raised to at least the credit value
    /// of that duration. Reconciliation adjusts the historical record only;
    /// the ledger keeps exactly what the ticks debited.
    ///
    /// Finalizing an already-closed session is a no-op that returns the
    /// stored summary.
    pub fn finalize(&mut self, reason: CloseReason, now: DateTime<Utc>) -> FinalUsage {
        if !self.is_active {
            return self.final_usage();
        }
        let elapsed = (now - self.started_at).num_seconds().max(0);
        self.seconds_used = self.seconds_used.max(elapsed);
        self.credits_used = self.credits_used.max(credits_for_seconds(self.seconds_used));
        self.is_active = false;
        self.close_reason = Some(reason);
        self.ended_at = Some(now);
        self.final_usage()
    }

    /// The closing summary of a finalized session.
    ///
    /// Intended for closed sessions; an active one reports its running
    /// accumulators with a `Stopped` reason as a conservative stand-in.
    #[must_use]
    pub fn final_usage(&self) -> FinalUsage {
        FinalUsage {
            session_id: self.session_id,
            account_id: self.account_id,
            seconds_used: self.seconds_used,
            credits_used: self.credits_used,
            close_reason: self.close_reason.unwrap_or(CloseReason::Stopped),
            started_at: self.started_at,
            ended_at: self.ended_at.unwrap_or(self.started_at),
        }
    }
}

/// Why a session stopped being metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The user ended the call.
    Stopped,

    /// The balance reached the depletion floor.
    Depleted,

    /// The transport tier reported the caller gone.
    Disconnected,

    /// A newer session for the same account replaced this one.
    Superseded,
}

/// The immutable summary of a closed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalUsage {
    /// The session this summarizes.
    pub session_id: SessionId,

    /// The account that was metered.
    pub account_id: AccountId,

    /// Total seconds accounted for, after wall-clock reconciliation.
    pub seconds_used: i64,

    /// Total credit value of the session, after reconciliation.
    pub credits_used: Credits,

    /// Why the session ended.
    pub close_reason: CloseReason,

    /// When metering began.
    pub started_at: DateTime<Utc>,

    /// When the session was finalized.
    pub ended_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> UsageSession {
        UsageSession::start(
            AccountId::generate(),
            "en".to_string(),
            "ko".to_string(),
            None,
        )
    }

    #[test]
    fn start_accounts_for_minimum_charge() {
        let s = session();
        assert!(s.is_active);
        assert_eq!(s.seconds_used, 3);
        assert_eq!(s.credits_used, Credits::from_hundredths(5));
        assert!(s.close_reason.is_none());
        assert!(s.ended_at.is_none());
    }

    #[test]
    fn ticks_accumulate() {
        let mut s = session();
        s.apply_tick();
        s.apply_tick();
        assert_eq!(s.seconds_used, 9);
        assert_eq!(s.credits_used, Credits::from_hundredths(15));
    }

    #[test]
    fn finalize_keeps_tick_figures_when_clock_agrees() {
        let mut s = session();
        s.apply_tick();
        let now = s.started_at + Duration::seconds(6);
        let usage = s.finalize(CloseReason::Stopped, now);

        assert_eq!(usage.seconds_used, 6);
        assert_eq!(usage.credits_used, Credits::from_hundredths(10));
        assert_eq!(usage.close_reason, CloseReason::Stopped);
        assert!(!s.is_active);
    }

    #[test]
    fn finalize_reconciles_against_wall_clock() {
        // One tick accounted (6 s) but 10 s actually elapsed: the record is
        // raised to 10 s and its credit value, 0.17.
        let mut s = session();
        s.apply_tick();
        let now = s.started_at + Duration::seconds(10);
        let usage = s.finalize(CloseReason::Disconnected, now);

        assert_eq!(usage.seconds_used, 10);
        assert_eq!(usage.credits_used, Credits::from_hundredths(17));
    }

    #[test]
    fn finalize_never_lowers_the_record() {
        // Clock went backwards relative to the accumulators; keep the ticks.
        let mut s = session();
        s.apply_tick();
        let usage = s.finalize(CloseReason::Stopped, s.started_at);

        assert_eq!(usage.seconds_used, 6);
        assert_eq!(usage.credits_used, Credits::from_hundredths(10));
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut s = session();
        let first = s.finalize(CloseReason::Stopped, s.started_at + Duration::seconds(2));
        // A later, different close attempt must not move anything.
        let second = s.finalize(
            CloseReason::Disconnected,
            s.started_at + Duration::seconds(60),
        );

        assert_eq!(first, second);
        assert_eq!(second.close_reason, CloseReason::Stopped);
    }

    #[test]
    fn sub_tick_hangup_keeps_minimum_charge() {
        let mut s = session();
        let usage = s.finalize(CloseReason::Stopped, s.started_at + Duration::seconds(1));

        assert_eq!(usage.seconds_used, 3);
        assert_eq!(usage.credits_used, Credits::from_hundredths(5));
    }
}
