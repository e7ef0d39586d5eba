//! Parlo billing HTTP API service.
//!
//! This crate exposes the billing engine over HTTP for the mobile client and
//! the other Parlo backend services:
//!
//! - Account registration and balance queries
//! - Credit package catalog and purchases
//! - Translation session start/stop and live depletion notices
//! - Payment processor webhooks
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **Bearer tokens** - End-user requests, verified against the Parlo auth
//!    service's introspection endpoint
//! 2. **Service API keys** - Service-to-service requests (the transport tier,
//!    balance checks from the translation gateway)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Small handlers stay async to keep routing uniform

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
