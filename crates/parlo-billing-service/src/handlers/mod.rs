//! API handlers.

// Allow precision loss in handlers - displayed prices are well within f64 precision
#![allow(clippy::cast_precision_loss)]

pub mod accounts;
pub mod credits;
pub mod health;
pub mod sessions;
pub mod transport;
pub mod webhooks;
