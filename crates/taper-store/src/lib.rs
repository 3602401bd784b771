//! `RocksDB` storage layer for taper.
//!
//! This crate provides persistent storage for OTP challenges, per-device
//! refresh sessions, and users using `RocksDB` with column families for
//! efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `otps`: OTP challenges, keyed by `user_id || code`
//! - `refresh_sessions`: Refresh sessions, keyed by `user_id || device_id`
//! - `refresh_by_token`: Index from a token digest to its session key
//! - `users`: User records, keyed by `user_id`
//! - `users_by_mobile`: Index from mobile number to `user_id`
//!
//! The two compare-and-swap operations, [`Store::consume_otp`] and
//! [`Store::rotate_refresh_session`], check and write in a single step so
//! callers never read-then-write across two calls.
//!
//! # Example
//!
//! ```no_run
//! use taper_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/taper-db").unwrap();
//!
//! let user = store.get_user_by_mobile("+15550001111").unwrap();
//! # let _ = user;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{OtpChallenge, RefreshSession, RotationOutcome, User, UserStatus};

use chrono::{DateTime, Utc};
use taper_core::{DeviceId, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, or a decorator that counts calls in tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // OTP Operations
    // =========================================================================

    /// Insert an OTP challenge.
    ///
    /// A challenge with the same user and code replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_otp(&self, otp: &OtpChallenge) -> Result<()>;

    /// Atomically consume a matching, unused, unexpired challenge.
    ///
    /// Returns `true` if a challenge was consumed. At most one caller can
    /// consume a given challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn consume_otp(&self, user_id: &UserId, code: &str, now: DateTime<Utc>) -> Result<bool>;

    /// List all challenges of a user, used or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_otps(&self, user_id: &UserId) -> Result<Vec<OtpChallenge>>;

    /// Delete a user's challenges that are used or expired at `now`.
    ///
    /// Returns the number of challenges removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_expired_otps(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<usize>;

    // =========================================================================
    // Refresh Session Operations
    // =========================================================================

    /// Insert or replace the refresh session of a device.
    ///
    /// This also maintains the token index, dropping the entry of any token
    /// the session previously held.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_refresh_session(&self, session: &RefreshSession) -> Result<()>;

    /// Get the refresh session of a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_refresh_session(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<RefreshSession>>;

    /// Delete the refresh session of a device.
    ///
    /// Returns `true` if a session existed. Deleting an absent session is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_refresh_session(&self, user_id: &UserId, device_id: &DeviceId) -> Result<bool>;

    /// Delete every refresh session of a user.
    ///
    /// Returns the number of sessions removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_user_sessions(&self, user_id: &UserId) -> Result<usize>;

    /// Find the session currently holding `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_refresh_session_by_token(&self, token: &str) -> Result<Option<RefreshSession>>;

    /// Replace a session only if it currently holds `expected_token` and has
    /// not expired at `now`.
    ///
    /// The session is addressed by `replacement.user_id` and
    /// `replacement.device_id`. Nothing is written unless the outcome is
    /// [`RotationOutcome::Rotated`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn rotate_refresh_session(
        &self,
        expected_token: &str,
        replacement: &RefreshSession,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome>;

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// This also maintains the mobile index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another user already has the mobile
    /// number.
    fn put_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Get a user by mobile number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user_by_mobile(&self, mobile: &str) -> Result<Option<User>>;
}
