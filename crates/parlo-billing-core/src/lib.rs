//! Core types for parlo-billing.
//!
//! This crate provides the foundational types used throughout the Parlo
//! billing engine:
//!
//! - **Identifiers**: `AccountId`, `SessionId`, `PurchaseId`
//! - **Credits**: the fixed-point `Credits` amount
//! - **Rates**: metering constants and the credit package catalog
//! - **Accounts**: the prepaid `Account` record
//! - **Sessions**: `UsageSession`, `FinalUsage`, `CloseReason`
//! - **Purchases**: `Purchase`, `PurchaseStatus`
//!
//! # Credit unit
//!
//! **1 credit = 60 seconds of live translation**
//!
//! - Metering advances in 3-second ticks of 0.05 credits each
//! - Amounts carry two fraction digits and are stored as `i64` hundredths,
//!   so repeated tick debits stay exact

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod ids;
pub mod purchase;
pub mod rate;
pub mod session;

pub use account::Account;
pub use credits::{Credits, CreditsParseError};
pub use ids::{AccountId, IdError, PurchaseId, SessionId};
pub use purchase::{Purchase, PurchaseStatus};
pub use rate::{
    credits_for_seconds, package, CreditPackage, CREDIT_PACKAGES, DEPLETION_FLOOR,
    MIN_SESSION_CHARGE, MIN_START_BALANCE, SECONDS_PER_CREDIT, STARTING_GRANT, TICK_CHARGE,
    TICK_INTERVAL, TICK_SECONDS,
};
pub use session::{CloseReason, FinalUsage, UsageSession};
