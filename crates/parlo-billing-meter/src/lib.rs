//! Session metering and credit accounting for parlo-billing.
//!
//! This crate runs the billing side of a live translation call:
//!
//! - [`BillingEngine`] is the service-facing handle: create accounts, start
//!   and stop sessions, settle purchases, subscribe to depletion notices.
//! - [`SessionRegistry`] owns session lifecycle against the store.
//! - Each running session has a clock task ([`MeterHandle`]) that debits one
//!   tick charge every three seconds until the session stops or the balance
//!   reaches the depletion floor.
//!
//! Charging is store-atomic: a tick either debits the ledger and advances
//! the session's accumulators together, or does neither. The engine's job on
//! top of that is purely coordination, making sure one clock runs per
//! account and that every close path (stop, depletion, supersession,
//! disconnect, shutdown) converges on the same finalized record.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod notice;
pub mod registry;

pub use clock::MeterHandle;
pub use engine::BillingEngine;
pub use error::{MeterError, Result};
pub use notice::DepletionNotice;
pub use registry::SessionRegistry;
