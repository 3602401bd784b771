//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys put the user id first so every per-user record can be found
//! with one prefix scan.

use taper_core::{DeviceId, UserId};

/// Encode a user prefix for scanning a user's OTPs or refresh sessions.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Encode an OTP key: `user_id || code`.
#[must_use]
pub fn otp_key(user_id: &UserId, code: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + code.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(code.as_bytes());
    key
}

/// Encode a refresh session key: `user_id || device_id`.
#[must_use]
pub fn refresh_session_key(user_id: &UserId, device_id: &DeviceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(device_id.as_bytes());
    key
}

/// Encode a refresh token index key: the blake3 digest of the token.
///
/// The raw token never appears in a key.
#[must_use]
pub fn refresh_token_key(token: &str) -> Vec<u8> {
    blake3::hash(token.as_bytes()).as_bytes().to_vec()
}

/// Encode a user key (just the user ID bytes).
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Encode a mobile index key.
#[must_use]
pub fn mobile_key(mobile: &str) -> Vec<u8> {
    mobile.as_bytes().to_vec()
}

/// Decode a user ID from a 16-byte index value.
#[must_use]
pub fn decode_user_id(value: &[u8]) -> Option<UserId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(UserId::from_bytes(bytes))
}
