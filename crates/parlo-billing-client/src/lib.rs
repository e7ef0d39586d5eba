//! Parlo Billing Client SDK.
//!
//! This crate provides a client library for services to interact with the
//! parlo-billing API. The transport tier uses it to gate call setup on the
//! caller's balance and to report connects and disconnects.
//!
//! # Example
//!
//! ```no_run
//! use parlo_billing_client::BillingClient;
//! use parlo_billing_core::MIN_START_BALANCE;
//!
//! # async fn example() -> Result<(), parlo_billing_client::ClientError> {
//! let client = BillingClient::new(
//!     "http://parlo-billing.billing-system.svc:8080",
//!     "your-service-api-key",
//! );
//!
//! // Refuse call setup when the caller can't afford a session
//! let check = client.check_balance("account-uuid", MIN_START_BALANCE).await?;
//! if check.sufficient {
//!     client.transport_connected("account-uuid").await?;
//! }
//!
//! // Later, when the media connection drops
//! let response = client.transport_disconnected("account-uuid").await?;
//! if let Some(usage) = response.final_usage {
//!     println!("session {} used {} credits", usage.session_id, usage.credits_used);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{BillingClient, ClientOptions};
pub use error::ClientError;
pub use types::*;
