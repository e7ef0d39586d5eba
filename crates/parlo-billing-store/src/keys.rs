//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use parlo_billing_core::{AccountId, PurchaseId, SessionId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a session key from a session ID.
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.to_bytes().to_vec()
}

/// Create an account-session index key.
///
/// Format: `account_id (16 bytes) || session_id (16 bytes)`
///
/// Since ULIDs are time-ordered, an account's sessions sort chronologically.
#[must_use]
pub fn account_session_key(account_id: &AccountId, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&session_id.to_bytes());
    key
}

/// Create a prefix for iterating all sessions of an account.
#[must_use]
pub fn account_sessions_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the session ID from an account-session index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_session_id_from_account_key(key: &[u8]) -> SessionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    SessionId::from_bytes(bytes)
}

/// Create a purchase key from a purchase ID.
#[must_use]
pub fn purchase_key(purchase_id: &PurchaseId) -> Vec<u8> {
    purchase_id.to_bytes().to_vec()
}

/// Create an account-purchase index key.
///
/// Format: `account_id (16 bytes) || purchase_id (16 bytes)`
#[must_use]
pub fn account_purchase_key(account_id: &AccountId, purchase_id: &PurchaseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&purchase_id.to_bytes());
    key
}

/// Create a prefix for iterating all purchases of an account.
#[must_use]
pub fn account_purchases_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the purchase ID from an account-purchase index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_purchase_id_from_account_key(key: &[u8]) -> PurchaseId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    PurchaseId::from_bytes(bytes)
}
