//! Metering rate constants and the credit package catalog.
//!
//! The whole pricing model hangs off one exchange rate: **1 credit buys 60
//! seconds of live translation**. Metering advances in 3-second ticks, so a
//! tick costs 0.05 credits, and 0.05 is also the minimum charge, the minimum
//! balance to start, and the depletion cutoff.

use crate::credits::Credits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Rate constants
// ============================================================================

/// Seconds of translation one credit buys.
pub const SECONDS_PER_CREDIT: i64 = 60;

/// Seconds of usage each metering tick accounts for.
pub const TICK_SECONDS: i64 = 3;

/// Wall-clock spacing between metering ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(3);

/// Credits debited per metering tick (3 s at 1 credit / 60 s).
pub const TICK_CHARGE: Credits = Credits::from_hundredths(5);

/// Charge taken up front when a session starts, kept even if the caller
/// hangs up before the first tick.
pub const MIN_SESSION_CHARGE: Credits = TICK_CHARGE;

/// Smallest balance that permits starting a session.
pub const MIN_START_BALANCE: Credits = TICK_CHARGE;

/// A tick that leaves the balance at or below this amount is the session's
/// last. The cutoff is one tick's worth, not zero, so a residue of up to
/// 0.05 credits can remain after depletion.
pub const DEPLETION_FLOOR: Credits = TICK_CHARGE;

/// Free credits granted when an account is registered.
pub const STARTING_GRANT: Credits = Credits::from_whole(10);

/// Convert a duration in seconds to its credit value at the standard rate,
/// rounded half-up to the hundredth. Non-positive durations are worth zero.
#[must_use]
pub const fn credits_for_seconds(seconds: i64) -> Credits {
    if seconds <= 0 {
        return Credits::ZERO;
    }
    Credits::from_hundredths((seconds * 100 + SECONDS_PER_CREDIT / 2) / SECONDS_PER_CREDIT)
}

// ============================================================================
// Credit packages
// ============================================================================

/// A purchasable credit bundle.
///
/// Packages are addressed by their position in [`CREDIT_PACKAGES`]; the
/// mobile client sends that index when initiating a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Credits granted when the purchase completes.
    pub credits: Credits,

    /// Price in minor currency units (cents).
    pub price_minor_units: i64,
}

/// The fixed package catalog, ordered small to large.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        credits: Credits::from_whole(10),
        price_minor_units: 150,
    },
    CreditPackage {
        credits: Credits::from_whole(30),
        price_minor_units: 400,
    },
    CreditPackage {
        credits: Credits::from_whole(60),
        price_minor_units: 750,
    },
    CreditPackage {
        credits: Credits::from_whole(150),
        price_minor_units: 1600,
    },
];

/// Look up a package by catalog index.
#[must_use]
pub fn package(index: usize) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.get(index)
}
