//! Stripe-compatible webhook payload signing.
//!
//! The signed content is `"{unix_timestamp}.{json_payload}"` and the
//! header format is `t=<ts>,v1=<hex hmac-sha256>`. This is wire-exact:
//! client SDK signature verifiers must accept simulator deliveries
//! unchanged.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature on every delivery.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Hex-encoded HMAC-SHA256 over `"{timestamp}.{payload}"`.
pub fn sign_payload(payload: &str, secret: &SecretString, timestamp: i64) -> String {
    let signed_content = format!("{}.{}", timestamp, payload);
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signed_content.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// The full header value: `t=<ts>,v1=<signature>`.
pub fn build_signature_header(payload: &str, secret: &SecretString, timestamp: i64) -> String {
    format!("t={},v1={}", timestamp, sign_payload(payload, secret, timestamp))
}

/// Verify a header produced by [`build_signature_header`].
///
/// Constant-time comparison; used by the simulator's own test harness
/// to assert deliveries verify the way client SDKs would.
pub fn verify_signature_header(header: &str, payload: &str, secret: &SecretString) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut provided: Option<Vec<u8>> = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => provided = hex::decode(value).ok(),
            _ => {}
        }
    }
    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return false;
    };

    let signed_content = format!("{}.{}", timestamp, payload);
    let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(signed_content.as_bytes());
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() == 1
}
