//! The per-session billing clock.
//!
//! Each active session owns one clock task that debits a tick charge every
//! three seconds until the session is stopped or the balance falls to the
//! depletion floor. The task is the only writer of tick debits for its
//! session; stopping it through [`MeterHandle::stop`] is what guarantees no
//! charge lands after a session is finalized.

use std::sync::Arc;

use parlo_billing_core::{
    CloseReason, Credits, FinalUsage, SessionId, DEPLETION_FLOOR, TICK_CHARGE, TICK_INTERVAL,
};
use parlo_billing_store::{Store, StoreError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{MeterError, Result};
use crate::notice::DepletionNotice;
use crate::registry::SessionRegistry;

/// Outcome of one tick attempt against the store.
enum TickOutcome {
    /// Charge applied, balance still above the floor.
    Ticked { balance_after: Credits },
    /// The session must end: the balance is at or below the floor, or the
    /// next charge wouldn't fit.
    Depleted { balance_remaining: Credits },
    /// The session row is gone or already closed under us.
    SessionGone,
    /// The store failed twice in a row; billing for this session can't
    /// continue safely.
    Stalled,
}

/// Handle to a running clock task.
///
/// Dropping the handle also ends metering (the clock sees the closed channel
/// and finalizes the session as stopped), but only [`MeterHandle::stop`]
/// hands the final usage back to the caller.
pub struct MeterHandle {
    session_id: SessionId,
    stop_tx: mpsc::Sender<CloseReason>,
    join: JoinHandle<Result<FinalUsage>>,
}

impl MeterHandle {
    /// The session this clock meters.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Stop the clock and wait for the session to be finalized.
    ///
    /// If the clock already ended on its own (depletion, store races) the
    /// stop signal is ignored and the task's own result is returned, so the
    /// caller always sees the reason the session actually closed with.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::ClockTask` if the task panicked, or whatever
    /// error the task itself exited with.
    pub async fn stop(self, reason: CloseReason) -> Result<FinalUsage> {
        let _ = self.stop_tx.send(reason).await;
        self.join
            .await
            .map_err(|e| MeterError::ClockTask(e.to_string()))?
    }
}

/// Spawn a clock task for the session.
pub(crate) fn spawn_clock(
    store: Arc<dyn Store>,
    registry: SessionRegistry,
    session_id: SessionId,
    depletion_tx: broadcast::Sender<DepletionNotice>,
) -> MeterHandle {
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let join = tokio::spawn(run_clock(
        store,
        registry,
        session_id,
        stop_rx,
        depletion_tx,
    ));
    MeterHandle {
        session_id,
        stop_tx,
        join,
    }
}

async fn run_clock(
    store: Arc<dyn Store>,
    registry: SessionRegistry,
    session_id: SessionId,
    mut stop_rx: mpsc::Receiver<CloseReason>,
    depletion_tx: broadcast::Sender<DepletionNotice>,
) -> Result<FinalUsage> {
    // The opening charge covered the first interval, so the first tick is
    // due a full interval from now.
    let mut ticks = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Balance after the most recent successful debit, for the notice we
    // publish if the store stalls and we have to close defensively.
    let mut last_balance = None;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                match apply_tick(store.as_ref(), &session_id) {
                    TickOutcome::Ticked { balance_after } => {
                        last_balance = Some(balance_after);
                    }
                    TickOutcome::Depleted { balance_remaining } => {
                        let usage = registry.close(&session_id, CloseReason::Depleted)?;
                        publish_depletion(&depletion_tx, &usage, balance_remaining);
                        return Ok(usage);
                    }
                    TickOutcome::SessionGone => {
                        // Someone else closed the record; close() just hands
                        // back the stored summary.
                        return registry.close(&session_id, CloseReason::Stopped);
                    }
                    TickOutcome::Stalled => {
                        let usage = registry.close(&session_id, CloseReason::Depleted)?;
                        if let Some(balance) = last_balance {
                            publish_depletion(&depletion_tx, &usage, balance);
                        }
                        return Ok(usage);
                    }
                }
            }
            reason = stop_rx.recv() => {
                let reason = reason.unwrap_or(CloseReason::Stopped);
                return registry.close(&session_id, reason);
            }
        }
    }
}

/// Attempt one tick debit, retrying once on a transient store failure.
fn apply_tick(store: &dyn Store, session_id: &SessionId) -> TickOutcome {
    match try_tick(store, session_id) {
        Ok(outcome) => outcome,
        Err(first) => {
            tracing::warn!(
                session_id = %session_id,
                error = %first,
                "tick debit failed, retrying once"
            );
            match try_tick(store, session_id) {
                Ok(outcome) => outcome,
                Err(second) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %second,
                        "tick debit failed twice, ending session"
                    );
                    TickOutcome::Stalled
                }
            }
        }
    }
}

fn try_tick(store: &dyn Store, session_id: &SessionId) -> std::result::Result<TickOutcome, StoreError> {
    match store.debit_for_tick(session_id, TICK_CHARGE) {
        Ok(receipt) => {
            tracing::debug!(
                session_id = %session_id,
                seconds_used = receipt.session.seconds_used,
                balance_after = %receipt.balance_after,
                "tick charged"
            );
            if receipt.balance_after <= DEPLETION_FLOOR {
                Ok(TickOutcome::Depleted {
                    balance_remaining: receipt.balance_after,
                })
            } else {
                Ok(TickOutcome::Ticked {
                    balance_after: receipt.balance_after,
                })
            }
        }
        Err(StoreError::InsufficientFunds { balance, .. }) => Ok(TickOutcome::Depleted {
            balance_remaining: balance,
        }),
        Err(StoreError::SessionClosed { .. } | StoreError::NotFound { .. }) => {
            Ok(TickOutcome::SessionGone)
        }
        Err(other) => Err(other),
    }
}

fn publish_depletion(
    depletion_tx: &broadcast::Sender<DepletionNotice>,
    usage: &FinalUsage,
    balance_remaining: Credits,
) {
    let notice = DepletionNotice {
        account_id: usage.account_id,
        session_id: usage.session_id,
        seconds_used: usage.seconds_used,
        credits_used: usage.credits_used,
        balance_remaining,
    };
    tracing::info!(
        account_id = %notice.account_id,
        session_id = %notice.session_id,
        balance_remaining = %notice.balance_remaining,
        "credits depleted, session ended"
    );
    let _ = depletion_tx.send(notice); // Nobody listening is fine.
}
