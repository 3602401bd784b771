//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// OTP challenges, keyed by `user_id || code`.
    pub const OTPS: &str = "otps";

    /// Refresh sessions, keyed by `user_id || device_id`.
    pub const REFRESH_SESSIONS: &str = "refresh_sessions";

    /// Index: refresh session key by `blake3(token_value)`.
    pub const REFRESH_BY_TOKEN: &str = "refresh_by_token";

    /// User records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Index: `user_id` by mobile number.
    pub const USERS_BY_MOBILE: &str = "users_by_mobile";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::OTPS,
        cf::REFRESH_SESSIONS,
        cf::REFRESH_BY_TOKEN,
        cf::USERS,
        cf::USERS_BY_MOBILE,
    ]
}
