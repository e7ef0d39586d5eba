//! Cryptographic helpers for payment webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `message` under `secret` and return it hex-encoded
/// (64 characters).
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size per
/// RFC 2104, so `new_from_slice` cannot fail for a real implementation.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC-SHA256 accepts any key length per RFC 2104.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

/// Compare two signature strings without an early exit, so the comparison
/// time does not leak how many leading characters matched.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
